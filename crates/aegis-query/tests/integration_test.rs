//! Aegis Query - Integration Tests
//!
//! End-to-end behavior of links, accessors, cascades and nested queries
//! over a small blog dataset.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use aegis_common::{AegisError, ExecutionMode, Principal, QueryConfig};
use aegis_document::{Document, DocumentEngine, DocumentId, Filter, Query, Value};
use aegis_links::{LinkConfig, Links};
use aegis_query::{resolve_query, QueryEngine};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

// =============================================================================
// Dataset
// =============================================================================

fn insert(links: &Links, collection: &str, value: JsonValue) {
    links
        .engine()
        .insert(collection, Document::from_json(value).unwrap())
        .unwrap();
}

fn declare(links: &Links) {
    links
        .add_links(
            "authors",
            [
                ("groups", LinkConfig::many("groups").with_metadata()),
                ("profile", LinkConfig::one("profiles").field("profileId").unique().autoremove()),
                ("posts", LinkConfig::inverse("posts", "author")),
                ("comments", LinkConfig::inverse("comments", "author")),
            ],
        )
        .unwrap();
    links
        .add_links(
            "posts",
            [
                ("author", LinkConfig::one("authors").field("authorId").index()),
                ("tags", LinkConfig::many("tags").field("tagIds")),
                ("category", LinkConfig::one("categories").with_metadata()),
                ("comments", LinkConfig::inverse("comments", "post")),
            ],
        )
        .unwrap();
    links
        .add_links(
            "comments",
            [
                ("post", LinkConfig::one("posts").field("postId")),
                ("author", LinkConfig::one("authors").field("authorId")),
            ],
        )
        .unwrap();
    links
        .add_links("tags", [("posts", LinkConfig::inverse("posts", "tags"))])
        .unwrap();
    links
        .add_links("groups", [("members", LinkConfig::inverse("authors", "groups"))])
        .unwrap();
    links
        .add_links("profiles", [("author", LinkConfig::inverse("authors", "profile"))])
        .unwrap();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn dataset() -> Arc<Links> {
    init_tracing();
    let links = Links::new(Arc::new(DocumentEngine::new()));
    declare(&links);

    for (id, name) in [("g1", "editors"), ("g2", "readers")] {
        insert(&links, "groups", json!({"_id": id, "name": name}));
    }
    for (id, bio) in [("pr1", "writes a lot"), ("pr2", "mostly reads")] {
        insert(&links, "profiles", json!({"_id": id, "bio": bio}));
    }
    insert(
        &links,
        "authors",
        json!({"_id": "a1", "name": "Ada", "profileId": "pr1",
               "groups_groups_metas": [{"_id": "g1", "role": "owner"}, {"_id": "g2", "role": "member"}]}),
    );
    insert(
        &links,
        "authors",
        json!({"_id": "a2", "name": "Brian", "profileId": "pr2",
               "groups_groups_metas": [{"_id": "g2", "role": "member"}]}),
    );
    insert(&links, "authors", json!({"_id": "a3", "name": "Cleo"}));

    for (id, name) in [("t1", "rust"), ("t2", "databases"), ("t3", "unused")] {
        insert(&links, "tags", json!({"_id": id, "name": name}));
    }
    insert(&links, "categories", json!({"_id": "cat1", "name": "Engineering"}));

    insert(
        &links,
        "posts",
        json!({"_id": "p1", "title": "Zero tags", "authorId": "a1", "meta": {"views": 10, "lang": "en"}}),
    );
    insert(
        &links,
        "posts",
        json!({"_id": "p2", "title": "One tag", "authorId": "a1", "tagIds": ["t1"],
               "meta": {"views": 30, "lang": "fr"}}),
    );
    insert(
        &links,
        "posts",
        json!({"_id": "p3", "title": "Two tags", "authorId": "a2", "tagIds": ["t1", "t2"],
               "meta": {"views": 20, "lang": "en"}}),
    );

    for (id, post, author, text) in [
        ("c1", "p1", "a2", "Nice"),
        ("c2", "p1", "a3", "Agreed"),
        ("c3", "p2", "a2", "Typo in line 3"),
        ("c4", "p3", "a1", "Thanks"),
        ("c5", "p1", "a1", "Reply"),
    ] {
        insert(
            &links,
            "comments",
            json!({"_id": id, "postId": post, "authorId": author, "text": text}),
        );
    }
    links
}

fn run(links: &Arc<Links>, collection: &str, spec: &JsonValue, mode: ExecutionMode) -> Vec<JsonValue> {
    resolve_query(links, collection, spec, &Principal::anonymous(), mode)
        .unwrap()
        .iter()
        .map(Document::to_json)
        .collect()
}

fn stored(links: &Links, collection: &str, id: &str) -> Option<JsonValue> {
    links
        .engine()
        .get(collection, &DocumentId::new(id))
        .unwrap()
        .map(|d| d.to_json())
}

// =============================================================================
// Query Results
// =============================================================================

#[test]
fn test_tag_counts_per_post() {
    let links = dataset();
    for mode in [ExecutionMode::Recursive, ExecutionMode::Batched] {
        let rows = run(&links, "posts", &json!({"tags": {"name": 1}}), mode);
        let lengths: Vec<usize> = rows.iter().map(|r| r["tags"].as_array().unwrap().len()).collect();
        assert_eq!(lengths, vec![0, 1, 2]);

        for tag in rows[2]["tags"].as_array().unwrap() {
            let keys: Vec<&String> = tag.as_object().unwrap().keys().collect();
            assert_eq!(keys, vec!["_id", "name"]);
        }
        assert!(rows[2].get("tagIds").is_none());
    }
}

#[test]
fn test_engines_are_equivalent() {
    let links = dataset();
    let specs = [
        json!({"title": 1, "tags": {"name": 1}, "author": {"name": 1}}),
        json!({"name": 1, "posts": {"title": 1, "comments": {"text": 1, "author": {"name": 1}}}}),
        json!({"name": 1, "posts": {"$options": {"sort": {"meta.views": -1}, "limit": 1}, "title": 1}}),
        json!({"name": 1, "groups": {"name": 1}, "comments": {"text": 1, "$options": {"sort": {"text": 1}, "skip": 1}}}),
        json!({"name": 1, "members": {"name": 1, "profile": {"bio": 1}}}),
        json!({"bio": 1, "author": {"name": 1, "posts": {"meta": {"lang": 1}}}}),
        json!({"name": 1, "posts": {"title": 1, "$filters": {"meta.lang": "en"}, "tags": {"$all": 1}}}),
        json!({"title": 1, "comments": {"$options": {"sort": {"_id": -1}, "limit": 2}, "post": {"title": 1}}}),
    ];
    let roots = ["posts", "authors", "authors", "authors", "groups", "profiles", "tags", "posts"];

    for (collection, spec) in roots.iter().zip(specs.iter()) {
        let recursive = run(&links, collection, spec, ExecutionMode::Recursive);
        let batched = run(&links, collection, spec, ExecutionMode::Batched);
        assert_eq!(recursive, batched, "{} {}", collection, spec);

        let config = QueryConfig {
            group_slicing: false,
            ..Default::default()
        };
        let client_sliced: Vec<JsonValue> = QueryEngine::with_config(Arc::clone(&links), config)
            .resolve_with(collection, spec, &Principal::anonymous(), ExecutionMode::Batched)
            .unwrap()
            .iter()
            .map(Document::to_json)
            .collect();
        assert_eq!(recursive, client_sliced, "{} {}", collection, spec);
    }
}

#[test]
fn test_unique_inverse_collapses() {
    let links = dataset();
    let rows = run(&links, "profiles", &json!({"author": {"name": 1}}), ExecutionMode::Batched);
    assert_eq!(rows[0]["author"], json!({"_id": "a1", "name": "Ada"}));
    assert_eq!(rows[1]["author"], json!({"_id": "a2", "name": "Brian"}));
}

#[test]
fn test_dotted_fields_and_sorting() {
    let links = dataset();
    let rows = run(
        &links,
        "authors",
        &json!({"posts": {"meta": {"views": 1}, "$options": {"sort": {"meta.views": -1}}}}),
        ExecutionMode::Batched,
    );
    assert_eq!(
        rows[0]["posts"],
        json!([{"_id": "p2", "meta": {"views": 30}}, {"_id": "p1", "meta": {"views": 10}}])
    );
    assert_eq!(rows[2]["posts"], json!([]));
}

#[test]
fn test_many_meta_join() {
    let links = dataset();
    let rows = run(
        &links,
        "groups",
        &json!({"name": 1, "members": {"name": 1}}),
        ExecutionMode::Recursive,
    );
    assert_eq!(
        rows[1],
        json!({"_id": "g2", "name": "readers", "members": [{"_id": "a1", "name": "Ada"}, {"_id": "a2", "name": "Brian"}]})
    );
}

#[test]
fn test_firewall_narrows_every_engine() {
    let links = dataset();
    links.set_firewall("comments", |query: &mut Query, principal: &Principal| {
        match principal.id() {
            Some(author) => {
                query.filters.push(Filter::eq("authorId", author));
                Ok(())
            }
            None => Err(AegisError::AccessDenied("comments require a user".into())),
        }
    });

    let spec = json!({"title": 1, "comments": {"text": 1}});
    let user = Principal::user("a2");
    for mode in [ExecutionMode::Recursive, ExecutionMode::Batched] {
        let rows: Vec<JsonValue> = resolve_query(&links, "posts", &spec, &user, mode)
            .unwrap()
            .iter()
            .map(Document::to_json)
            .collect();
        assert_eq!(rows[0]["comments"], json!([{"_id": "c1", "text": "Nice"}]));
        assert_eq!(rows[2]["comments"], json!([]));

        let err = resolve_query(&links, "posts", &spec, &Principal::anonymous(), mode).unwrap_err();
        assert!(matches!(err, AegisError::AccessDenied(_)));
    }
}

#[test]
fn test_firewall_cannot_page_relationship_queries() {
    let links = dataset();
    links.set_firewall("comments", |query: &mut Query, _: &Principal| {
        query.filters.push(Filter::Ne {
            field: "authorId".into(),
            value: "a3".into(),
        });
        query.limit = Some(1);
        Ok(())
    });

    let spec = json!({"title": 1, "comments": {"text": 1}});
    let recursive = run(&links, "posts", &spec, ExecutionMode::Recursive);
    assert_eq!(recursive, run(&links, "posts", &spec, ExecutionMode::Batched));
    assert_eq!(
        recursive[0]["comments"],
        json!([{"_id": "c1", "text": "Nice"}, {"_id": "c5", "text": "Reply"}])
    );
}

#[test]
fn test_resolver_link() {
    let links = dataset();
    links
        .add_links(
            "authors",
            [(
                "commentCount",
                LinkConfig::resolver(|author, args| {
                    assert!(args.principal.is_anonymous());
                    Ok(vec![Value::from(author.id.as_str().len() as i64)])
                })
                .link_type(aegis_links::LinkType::One),
            )],
        )
        .unwrap();

    let spec = json!({"name": 1, "commentCount": 1});
    let recursive = run(&links, "authors", &spec, ExecutionMode::Recursive);
    assert_eq!(recursive, run(&links, "authors", &spec, ExecutionMode::Batched));
    assert_eq!(recursive[0]["commentCount"], json!(2));
}

// =============================================================================
// Accessors
// =============================================================================

#[test]
fn test_add_then_remove_is_empty() {
    let links = dataset();
    let mut tags = links.link_of("posts", &DocumentId::new("p3"), "tags").unwrap();

    tags.add("t3".into(), None).unwrap();
    tags.remove("t3".into()).unwrap();
    let names: Vec<JsonValue> = tags
        .find(Query::new())
        .unwrap()
        .fetch()
        .unwrap()
        .iter()
        .map(|d| d.to_json()["_id"].clone())
        .collect();
    assert_eq!(names, vec![json!("t1"), json!("t2")]);

    let mut empty = links.link_of("posts", &DocumentId::new("p1"), "tags").unwrap();
    empty.add("t3".into(), None).unwrap();
    empty.remove("t3".into()).unwrap();
    assert_eq!(empty.find(Query::new()).unwrap().count().unwrap(), 0);
}

#[test]
fn test_single_meta_category() {
    let links = dataset();
    let mut category = links.link_of("posts", &DocumentId::new("p1"), "category").unwrap();

    category
        .set("cat1".into(), Some(Value::from(json!({"date": "2024-05-01"}))))
        .unwrap();
    assert_eq!(
        category.metadata(None).unwrap().to_json(),
        json!({"_id": "cat1", "date": "2024-05-01"})
    );

    category
        .extend_metadata(None, Value::from(json!({"featured": true})))
        .unwrap();
    assert_eq!(
        category.metadata(None).unwrap().to_json(),
        json!({"_id": "cat1", "date": "2024-05-01", "featured": true})
    );

    category.unset().unwrap();
    assert_eq!(category.find(Query::new()).unwrap().count().unwrap(), 0);
}

#[test]
fn test_virtual_links_are_read_only() {
    let links = dataset();
    let mut posts = links.link_of("authors", &DocumentId::new("a1"), "posts").unwrap();

    let errors = [
        posts.add("p3".into(), None).unwrap_err(),
        posts.remove("p1".into()).unwrap_err(),
        posts.set("p3".into(), None).unwrap_err(),
        posts.unset().unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, AegisError::InvalidOperation(_)));
    }
    assert_eq!(posts.fetch(Query::new()).unwrap().as_array().map(Vec::len), Some(2));
}

#[test]
fn test_unique_many_is_rejected_at_registration() {
    let links = Links::new(Arc::new(DocumentEngine::new()));
    let err = links
        .add_links("posts", [("tags", LinkConfig::many("tags").unique())])
        .unwrap_err();
    assert!(matches!(err, AegisError::InvalidConfig(_)));
    assert!(links.get_linker("posts", "tags").is_none());
}

// =============================================================================
// Cascades
// =============================================================================

#[test]
fn test_deleting_tag_pulls_it_from_posts() {
    let links = dataset();
    links.remove("tags", &DocumentId::new("t1")).unwrap();

    assert_eq!(stored(&links, "posts", "p2").unwrap()["tagIds"], json!([]));
    assert_eq!(stored(&links, "posts", "p3").unwrap()["tagIds"], json!(["t2"]));
}

#[test]
fn test_deleting_author_unsets_posts_and_removes_profile() {
    let links = dataset();
    links.remove("authors", &DocumentId::new("a1")).unwrap();

    for post in ["p1", "p2"] {
        assert!(stored(&links, "posts", post).unwrap().get("authorId").is_none());
    }
    assert_eq!(stored(&links, "posts", "p3").unwrap()["authorId"], json!("a2"));
    assert!(stored(&links, "profiles", "pr1").is_none());
    assert!(stored(&links, "profiles", "pr2").is_some());
}

#[test]
fn test_deleting_group_detaches_metadata_entries() {
    let links = dataset();
    links.remove("groups", &DocumentId::new("g2")).unwrap();

    assert_eq!(
        stored(&links, "authors", "a1").unwrap()["groups_groups_metas"],
        json!([{"_id": "g1", "role": "owner"}])
    );
    assert_eq!(stored(&links, "authors", "a2").unwrap()["groups_groups_metas"], json!([]));
}

// =============================================================================
// Declarations from JSON
// =============================================================================

#[test]
fn test_links_declared_from_json() {
    let links = Links::new(Arc::new(DocumentEngine::new()));
    links
        .add_links_json(
            "posts",
            &json!({"tags": {"type": "*", "collection": "tags", "field": "tagIds"}}),
        )
        .unwrap();
    links
        .add_links_json("tags", &json!({"posts": {"collection": "posts", "inversedBy": "tags"}}))
        .unwrap();

    insert(&links, "tags", json!({"_id": "t1", "name": "rust"}));
    insert(&links, "posts", json!({"_id": "p1", "tagIds": ["t1"]}));

    let rows = run(&links, "tags", &json!({"posts": {"tagIds": 1}}), ExecutionMode::Batched);
    assert_eq!(rows, vec![json!({"_id": "t1", "posts": [{"_id": "p1", "tagIds": ["t1"]}]})]);
}
