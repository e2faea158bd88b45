//! End-to-end persistence tests against the in-memory server.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use restlayer::{memory::MemoryServer, prelude::*};

fn registry() -> Arc<SchemaRegistry> {
    let song = ClassSchema::new("Song")
        .with(AttributeDef::new("name", AttributeKind::String))
        .unwrap()
        .with(AttributeDef::new("play_count", AttributeKind::Integer))
        .unwrap()
        .with(AttributeDef::new("starred", AttributeKind::Boolean))
        .unwrap()
        .with(AttributeDef::new("tags", AttributeKind::Array))
        .unwrap();

    let playlist = ClassSchema::new("Playlist")
        .with(AttributeDef::new("name", AttributeKind::String))
        .unwrap()
        .with(AttributeDef::new("songs", AttributeKind::Relation).target("Song"))
        .unwrap();

    SchemaRegistry::builder()
        .register(song)
        .register(playlist)
        .build()
}

fn store(server: MemoryServer) -> RecordStore<MemoryServer> {
    RecordStore::new(server, registry())
}

async fn saved_song(store: &RecordStore<MemoryServer>, name: &str) -> Record {
    let mut song = Record::new(store.registry().get("Song").unwrap());
    song.set("name", json!(name), true);
    assert!(store.save(&mut song, SaveOptions::default()).await.unwrap());
    song
}

#[tokio::test]
async fn create_adopts_server_identity() {
    let store = store(MemoryServer::new());
    let mut song = Record::new(store.registry().get("Song").unwrap());
    song.set("name", json!("x"), true);

    // Exactly one create request, no relation requests.
    let requests = store.change_requests(&song, false);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].body, json!({"name": "x"}));

    assert!(store.save(&mut song, SaveOptions::default()).await.unwrap());

    assert!(song.object_id().is_some());
    assert!(song.created_at().is_some());
    assert!(!song.has_changes());
    assert!(!song.is_new());
}

#[tokio::test]
async fn save_without_changes_is_a_no_op() {
    let store = store(MemoryServer::new());
    let mut song = saved_song(&store, "x").await;

    assert!(store.save(&mut song, SaveOptions::default()).await.unwrap());
}

#[tokio::test]
async fn update_sends_only_changed_fields() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let mut song = saved_song(&store, "x").await;

    song.set("starred", json!(true), true);
    let requests = store.change_requests(&song, false);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, json!({"starred": true}));

    assert!(store.save(&mut song, SaveOptions::default()).await.unwrap());

    let stored = server
        .stored("Song", song.object_id().unwrap())
        .await
        .unwrap();
    assert_eq!(stored["starred"], json!(true));
    assert_eq!(stored["name"], json!("x"));
}

#[tokio::test]
async fn increment_survives_the_round_trip() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let mut song = Record::new(store.registry().get("Song").unwrap());
    song.set("play_count", json!(10), true);
    store.save(&mut song, SaveOptions::default()).await.unwrap();

    song.set("play_count", json!({"__op": "Increment", "amount": 5}), true);
    assert_eq!(song.get("play_count"), Some(json!(15)));
    store.save(&mut song, SaveOptions::default()).await.unwrap();

    let stored = server
        .stored("Song", song.object_id().unwrap())
        .await
        .unwrap();
    assert_eq!(stored["playCount"], json!(15));
}

#[tokio::test]
async fn relation_deltas_dispatch_by_half() {
    let server = MemoryServer::new();
    let store = store(server.clone());

    let s1 = saved_song(&store, "s1").await;
    let s2 = saved_song(&store, "s2").await;

    let mut playlist = Record::new(store.registry().get("Playlist").unwrap());
    playlist.set("name", json!("Roadtrip"), true);
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![s1.to_pointer().unwrap().to_value(), s2.to_pointer().unwrap().to_value()]);
    assert!(store.save(&mut playlist, SaveOptions::default()).await.unwrap());

    let id = playlist.object_id().unwrap().to_string();
    let members = server.relation_members("Playlist", &id, "songs").await;
    assert_eq!(members.len(), 2);
    assert!(!playlist.has_relation_changes());

    // add(p1); remove(p2) on a persisted record: one addition request for
    // p1's half, one removal request for p2's half.
    let s3 = saved_song(&store, "s3").await;
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![s3.to_pointer().unwrap().to_value()]);
    playlist
        .relation("songs")
        .unwrap()
        .remove(vec![s2.to_pointer().unwrap().to_value()]);

    let requests = store.change_requests(&playlist, false);
    assert_eq!(requests.len(), 2);

    assert!(store.update_relations(&mut playlist).await.unwrap());
    let members = server.relation_members("Playlist", &id, "songs").await;
    assert_eq!(members.len(), 2);
    assert!(members.contains(&s1.to_pointer().unwrap().to_value()));
    assert!(members.contains(&s3.to_pointer().unwrap().to_value()));
}

#[tokio::test]
async fn relation_members_are_queryable() {
    let server = MemoryServer::new();
    let store = store(server.clone());

    let s1 = saved_song(&store, "queryable").await;
    let _other = saved_song(&store, "unrelated").await;

    let mut playlist = Record::new(store.registry().get("Playlist").unwrap());
    playlist.set("name", json!("Mix"), true);
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![s1.to_pointer().unwrap().to_value()]);
    store.save(&mut playlist, SaveOptions::default()).await.unwrap();

    let related = store
        .find_related(&mut playlist, "songs", Query::new())
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].object_id(), s1.object_id());
}

#[tokio::test]
async fn update_relations_requires_identifier() {
    let store = store(MemoryServer::new());
    let mut playlist = Record::new(store.registry().get("Playlist").unwrap());
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![Pointer::new("Song", "s1").to_value()]);

    let result = store.update_relations(&mut playlist).await;
    assert!(matches!(result, Err(RecordLayerError::IllegalState(_))));
}

#[tokio::test]
async fn destroy_reverts_to_new() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let mut song = saved_song(&store, "doomed").await;
    let id = song.object_id().unwrap().to_string();

    assert!(store.destroy(&mut song).await.unwrap());
    assert!(song.is_new());
    assert!(song.created_at().is_none());
    assert!(server.stored("Song", &id).await.is_none());

    // Destroying a never-persisted record is a no-op.
    assert!(!store.destroy(&mut song).await.unwrap());
}

#[tokio::test]
async fn fetch_transitions_pointer_to_instance() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let song = saved_song(&store, "fetched").await;

    let mut pointer = Record::pointer(
        store.registry().get("Song").unwrap(),
        song.object_id().unwrap(),
    );
    assert!(pointer.is_pointer());

    assert!(store.fetch(&mut pointer).await.unwrap());
    assert!(!pointer.is_pointer());
    assert_eq!(pointer.get("name"), Some(json!("fetched")));
}

#[tokio::test]
async fn attribute_read_autofetches_pointers() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let song = saved_song(&store, "lazy").await;

    let mut pointer = Record::pointer(
        store.registry().get("Song").unwrap(),
        song.object_id().unwrap(),
    );
    let name = store.attribute(&mut pointer, "name").await.unwrap();

    assert_eq!(name, Some(json!("lazy")));
    assert!(!pointer.is_pointer());
}

#[tokio::test]
async fn immediate_array_ops_bypass_batching() {
    let server = MemoryServer::new();
    let store = store(server.clone());
    let mut song = saved_song(&store, "tagged").await;

    assert!(store
        .array_add_unique(&mut song, "tags", vec![json!("cool"), json!("modal")])
        .await
        .unwrap());
    assert!(store
        .array_remove(&mut song, "tags", vec![json!("cool")])
        .await
        .unwrap());

    let stored = server
        .stored("Song", song.object_id().unwrap())
        .await
        .unwrap();
    assert_eq!(stored["tags"], json!(["modal"]));

    // The proxy was reset: the next read sees no stale local copy.
    assert_eq!(song.get("tags"), None);
    assert!(!song.has_changes());
}

#[tokio::test]
async fn query_end_to_end() {
    let store = store(MemoryServer::new());
    for name in ["alpha", "beta", "gamma"] {
        saved_song(&store, name).await;
    }

    let schema = store.registry().get("Song").unwrap();

    let all = store.find(&schema, &Query::new()).await.unwrap();
    assert_eq!(all.len(), 3);

    let one = store
        .first(
            &schema,
            &Query::builder().constraint(Filter::eq("name", "beta")).build(),
        )
        .await
        .unwrap();
    assert_eq!(one.unwrap().get("name"), Some(json!("beta")));

    let count = store
        .count(
            &schema,
            &Query::builder()
                .constraint(Filter::contained_in("name", json!(["alpha", "gamma"])))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(count, 2);
}

/// Wrapper transport that rejects relation-delta requests, for exercising
/// partial-failure reconciliation.
#[derive(Debug)]
struct RelationOutage(MemoryServer);

#[async_trait]
impl Transport for RelationOutage {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<Value>,
    ) -> RecordLayerResult<Response> {
        let is_relation_delta = body
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|map| {
                map.values().any(|value| {
                    matches!(
                        value.get("__op").and_then(Value::as_str),
                        Some("AddRelation") | Some("RemoveRelation")
                    )
                })
            });
        if is_relation_delta {
            return Ok(Response::failure(500, "relation commits unavailable"));
        }

        self.0.send(method, path, body, query).await
    }
}

#[tokio::test]
async fn relation_failure_leaves_pending_sets_for_retry() {
    let server = MemoryServer::new();
    let failing = RecordStore::new(RelationOutage(server.clone()), registry());

    let mut playlist = Record::new(failing.registry().get("Playlist").unwrap());
    playlist.set("name", json!("Mix"), true);
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![Pointer::new("Song", "s1").to_value()]);

    // The create succeeds, the relation commit fails: the save reports
    // failure, attribute tracking is applied, the delta is still pending.
    let saved = failing
        .save(&mut playlist, SaveOptions::default())
        .await
        .unwrap();
    assert!(!saved);
    assert!(playlist.object_id().is_some());
    assert!(!playlist.has_attribute_changes());
    assert!(playlist.has_relation_changes());

    // Retrying the relation half alone against a healthy transport drains it.
    let healthy = RecordStore::new(server.clone(), registry());
    assert!(healthy.update_relations(&mut playlist).await.unwrap());
    assert!(!playlist.has_relation_changes());

    let members = server
        .relation_members("Playlist", playlist.object_id().unwrap(), "songs")
        .await;
    assert_eq!(members.len(), 1);
}

#[tokio::test]
async fn failed_save_can_raise() {
    let server = MemoryServer::new();
    let failing = RecordStore::new(RelationOutage(server), registry());

    let mut playlist = Record::new(failing.registry().get("Playlist").unwrap());
    playlist.set("name", json!("Mix"), true);
    playlist
        .relation("songs")
        .unwrap()
        .add(vec![Pointer::new("Song", "s1").to_value()]);

    let result = failing.save(&mut playlist, SaveOptions::raising()).await;
    assert!(matches!(
        result,
        Err(RecordLayerError::RecordNotSaved { class, .. }) if class == "Playlist"
    ));
}

#[tokio::test]
async fn or_query_matches_across_branches() {
    let store = store(MemoryServer::new());
    for (name, count) in [("a", 1), ("b", 5), ("c", 10)] {
        let mut song = Record::new(store.registry().get("Song").unwrap());
        song.set("name", json!(name), true);
        song.set("play_count", json!(count), true);
        store.save(&mut song, SaveOptions::default()).await.unwrap();
    }

    let schema = store.registry().get("Song").unwrap();
    let query = Query::builder()
        .or(merge(&[Filter::eq("name", "a")]))
        .or(merge(&[Filter::gte("play_count", 10)]))
        .build();

    let matched = store.find(&schema, &query).await.unwrap();
    assert_eq!(matched.len(), 2);
}
