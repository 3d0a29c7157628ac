//! End-to-end flows through the public API: store, projection, sync, recall.

use chrono::{TimeZone, Utc};
use soulsketch::packet::{codec, Entity, PacketFilter, Role, Visibility};
use soulsketch::{
    DirectoryTarget, EntryStore, MemoryEntry, MemoryPacket, MemoryVault, PacketBuilder,
    PacketStore, PacketView, SyncEngine,
};
use tempfile::TempDir;

fn kickoff() -> MemoryPacket {
    PacketBuilder::new("kickoff", "Kickoff")
        .created_at(Utc.with_ymd_and_hms(2025, 10, 14, 23, 8, 0).unwrap())
        .author("A")
        .content("Body text")
        .tags(["integration", "notion"])
        .visibility(Visibility::Collaborator)
        .secret("API_KEY", "xyz")
        .entity(Entity::new("Cassie", "agent").with_did("did:example:cassie"))
        .link("https://example.com/kickoff")
        .build()
        .unwrap()
}

#[tokio::test]
async fn kickoff_roundtrip_and_projection() {
    let dir = TempDir::new().unwrap();
    let store = PacketStore::new(dir.path().join("packets"));

    let mut packet = kickoff();
    let path = store.upsert(&mut packet).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "2025-10-14_kickoff.md");

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed = codec::parse(&text).unwrap();
    assert_eq!(parsed.tags, vec!["integration", "notion"]);
    assert_eq!(parsed.secrets, packet.secrets);
    assert_eq!(parsed.entities, packet.entities);

    let vault = MemoryVault::new(store);
    assert!(vault.read_as("kickoff", Role::Public).await.unwrap().is_none());

    let collab = vault.read_as("kickoff", Role::Collaborator).await.unwrap().unwrap();
    let json = serde_json::to_string(&collab).unwrap();
    assert!(!json.contains("xyz"));
    assert!(json.contains("Body text"));

    let owner = vault.read_as("kickoff", Role::Owner).await.unwrap().unwrap();
    assert_eq!(owner.secrets.as_ref(), Some(&packet.secrets));
}

#[tokio::test]
async fn public_view_of_public_packet_hides_body() {
    let dir = TempDir::new().unwrap();
    let vault = MemoryVault::new(PacketStore::new(dir.path()));

    let mut packet = kickoff();
    packet.visibility = Visibility::Public;
    vault.save(&mut packet).await.unwrap();

    let listing = vault
        .list_as(&PacketFilter::new().tag("notion"), Role::Public)
        .await
        .unwrap();
    assert_eq!(listing.views.len(), 1);
    let json = serde_json::to_string(&listing.views[0]).unwrap();
    assert!(!json.contains("xyz"));
    assert!(!json.contains("Body text"));
    assert!(!json.contains("Cassie"));
}

#[tokio::test]
async fn corrupted_file_does_not_block_listing() {
    let dir = TempDir::new().unwrap();
    let store = PacketStore::new(dir.path());
    for id in ["one", "two"] {
        let mut packet = kickoff();
        packet.id = id.to_string();
        store.upsert(&mut packet).await.unwrap();
    }
    std::fs::write(dir.path().join("2025-10-14_broken.md"), "# no metadata\n").unwrap();

    let listing = store.list(&PacketFilter::new()).await.unwrap();
    assert_eq!(listing.packets.len(), 2);
    assert!(listing.is_partial());

    let audit = store.audit().await.unwrap();
    assert_eq!(audit.failures.len(), 1);
}

#[tokio::test]
async fn sync_mirrors_only_projected_views() {
    let dir = TempDir::new().unwrap();
    let store = PacketStore::new(dir.path().join("packets"));
    store.upsert(&mut kickoff()).await.unwrap();

    let mirror = dir.path().join("mirror");
    let engine = SyncEngine::new(Box::new(DirectoryTarget::new(&mirror)), Role::Collaborator);
    let report = engine.sync(&store).await.unwrap();
    assert_eq!(report.pushed, vec!["kickoff".to_string()]);

    let text = std::fs::read_to_string(mirror.join("kickoff.json")).unwrap();
    assert!(!text.contains("xyz"));
    let view: PacketView = serde_json::from_str(&text).unwrap();
    assert_eq!(view.content.as_deref(), Some("Body text"));

    let again = engine.sync(&store).await.unwrap();
    assert!(again.pushed.is_empty());
    assert_eq!(again.unchanged, 1);
}

#[tokio::test]
async fn recall_prefers_latest_entry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entries.jsonl");
    let entries = EntryStore::open(&path).await.unwrap();

    let early = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2025, 10, 15, 8, 0, 0).unwrap();
    entries
        .insert(MemoryEntry::new("note", "handoff to Cassie", None).with_timestamp(late))
        .await
        .unwrap();
    entries
        .insert(MemoryEntry::new("note", "Cassie onboarding", None).with_timestamp(early))
        .await
        .unwrap();

    let reopened = EntryStore::open(&path).await.unwrap();
    let hits = reopened.search("cassie", 1).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].timestamp, late);
}
