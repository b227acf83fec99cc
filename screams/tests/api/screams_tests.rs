use std::time::Duration;

use super::support::*;

#[tokio::test]
async fn listing_is_public_and_newest_first() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let first = app.scream(&alice, "first").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = app.scream(&alice, "second").await;

    let (status, body) = app.get("/screams", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().expect("array");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["screamId"], json!(second));
    assert_eq!(listed[1]["screamId"], json!(first));
    assert_eq!(listed[0]["userHandle"], json!("alice"));
    assert_eq!(listed[0]["likeCount"], json!(0));
    assert_eq!(listed[0]["commentCount"], json!(0));
    assert_eq!(listed[0]["userImage"], json!("http://screams.test/media/no-img.png"));
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;

    let (status, body) = app.post("/scream", Some(&alice), json!({ "body": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "body": "Body must not be empty" }));

    let (_, listed) = app.get("/screams", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn posting_requires_a_valid_token() {
    let app = TestApp::new();
    let (status, body) = app.post("/scream", None, json!({ "body": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = app.post("/scream", Some("not.a-token"), json!({ "body": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn created_scream_is_echoed() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let (status, body) = app.post("/scream", Some(&alice), json!({ "body": "hello" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], json!("hello"));
    assert_eq!(body["userHandle"], json!("alice"));
    assert!(body["screamId"].is_string());
    assert!(body["createdAt"].as_str().and_then(timestamp::parse).is_some());
}

#[tokio::test]
async fn fetching_unknown_scream_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.get("/scream/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Scream not found" }));
}

#[tokio::test]
async fn comments_bump_the_counter_and_show_up_on_the_scream() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "hello").await;

    let (status, body) = app
        .post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Must not be empty" }));

    let (status, body) = app
        .post("/scream/missing/comment", Some(&bob), json!({ "body": "hey" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Scream not found" }));

    let (status, comment) = app
        .post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "hey" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comment["userHandle"], json!("bob"));
    assert_eq!(comment["screamId"], json!(scream_id));
    assert!(comment["commentId"].is_string());

    let (status, scream) = app.get(&format!("/scream/{scream_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scream["commentCount"], json!(1));
    assert_eq!(scream["screamId"], json!(scream_id));
    assert_eq!(scream["comments"].as_array().map(Vec::len), Some(1));
    assert_eq!(scream["comments"][0]["body"], json!("hey"));
}

#[tokio::test]
async fn liking_twice_is_rejected_and_counts_once() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "like me").await;

    let (status, body) = app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["likeCount"], json!(1));
    assert_eq!(body["screamId"], json!(scream_id));

    let (status, body) = app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Scream already liked" }));

    let scream = app.scream_doc(&scream_id).await.expect("scream");
    assert_eq!(scream["likeCount"], json!(1));
    assert_eq!(app.count_where(Collection::Likes, "screamId", &scream_id).await, 1);
}

#[tokio::test]
async fn concurrent_likes_by_one_user_count_once() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "race").await;
    let path = format!("/scream/{scream_id}/like");

    let (first, second) = tokio::join!(app.get(&path, Some(&bob)), app.get(&path, Some(&bob)));
    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);

    let scream = app.scream_doc(&scream_id).await.expect("scream");
    assert_eq!(scream["likeCount"], json!(1));
}

#[tokio::test]
async fn liking_unknown_scream_is_not_found() {
    let app = TestApp::new();
    let bob = app.signup("bob").await;
    let (status, body) = app.get("/scream/missing/like", Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Scream not found" }));
}

#[tokio::test]
async fn unliking_without_a_like_is_rejected() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "never liked").await;

    let (status, body) = app.get(&format!("/scream/{scream_id}/unlike"), Some(&bob)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Scream not liked" }));

    let scream = app.scream_doc(&scream_id).await.expect("scream");
    assert_eq!(scream["likeCount"], json!(0));
}

#[tokio::test]
async fn unliking_removes_the_like() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "fickle").await;

    app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    let (status, body) = app.get(&format!("/scream/{scream_id}/unlike"), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["likeCount"], json!(0));
    let like_id = Like::document_id(&scream_id, "bob");
    assert!(app.store.get(Collection::Likes, &like_id).await.unwrap().is_none());
}

#[tokio::test]
async fn only_the_author_can_delete() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "mine").await;

    let (status, body) = app.delete(&format!("/scream/{scream_id}"), Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
    assert!(app.scream_doc(&scream_id).await.is_some());

    let (status, body) = app.delete("/scream/missing", Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Scream not found" }));

    let (status, body) = app.delete(&format!("/scream/{scream_id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Scream deleted successfully" }));
    app.settle().await;
    assert!(app.scream_doc(&scream_id).await.is_none());
}

#[tokio::test]
async fn deleting_a_scream_cascades_once_triggers_run() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "doomed").await;
    let keeper = app.scream(&alice, "keeper").await;

    app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    app.post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "one" }))
        .await;
    app.post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "two" }))
        .await;
    app.get(&format!("/scream/{keeper}/like"), Some(&bob)).await;
    app.settle().await;
    assert_eq!(app.count_where(Collection::Notifications, "screamId", &scream_id).await, 3);

    app.delete(&format!("/scream/{scream_id}"), Some(&alice)).await;
    app.settle().await;

    for collection in [Collection::Comments, Collection::Likes, Collection::Notifications] {
        assert_eq!(app.count_where(collection, "screamId", &scream_id).await, 0, "{collection}");
    }
    assert_eq!(app.count_where(Collection::Likes, "screamId", &keeper).await, 1);
    assert_eq!(app.count_where(Collection::Notifications, "screamId", &keeper).await, 1);
}

#[tokio::test]
async fn uncomment_removes_comment_and_decrements() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "talk").await;

    let (_, comment) = app
        .post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "hi" }))
        .await;
    let comment_id = comment["commentId"].as_str().expect("commentId").to_string();

    let (status, body) = app.get("/scream/missing/uncomment", Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Comment not found" }));

    let (status, body) = app.get(&format!("/scream/{comment_id}/uncomment"), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Comment deleted successfully" }));

    let scream = app.scream_doc(&scream_id).await.expect("scream");
    assert_eq!(scream["commentCount"], json!(0));
    assert_eq!(app.count_where(Collection::Comments, "screamId", &scream_id).await, 0);
}

#[tokio::test]
async fn uncomment_on_a_vanished_scream_keeps_the_comment() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "short-lived").await;

    let (_, comment) = app
        .post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "hi" }))
        .await;
    let comment_id = comment["commentId"].as_str().expect("commentId").to_string();

    // Scream removed but the cascade has not run yet.
    assert!(app.store.delete(Collection::Screams, &scream_id).await.unwrap());

    let (status, body) = app.get(&format!("/scream/{comment_id}/uncomment"), Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Scream not found" }));
    assert!(app.store.get(Collection::Comments, &comment_id).await.unwrap().is_some());
}
