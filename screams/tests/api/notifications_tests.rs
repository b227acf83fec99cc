use chrono::{Duration, TimeZone, Utc};

use super::support::*;

#[tokio::test]
async fn likes_and_comments_notify_the_author() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "notice me").await;

    app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    app.post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "noticed" }))
        .await;
    app.settle().await;

    let (status, me) = app.get("/user", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let notifications = me["notifications"].as_array().expect("notifications");
    assert_eq!(notifications.len(), 2);
    let mut kinds: Vec<&str> = notifications.iter().filter_map(|n| n["type"].as_str()).collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["comment", "like"]);
    for notification in notifications {
        assert_eq!(notification["recipient"], json!("alice"));
        assert_eq!(notification["sender"], json!("bob"));
        assert_eq!(notification["screamId"], json!(scream_id));
        assert_eq!(notification["read"], json!(false));
        assert!(notification["notificationId"].is_string());
    }

    let like_id = Like::document_id(&scream_id, "bob");
    assert!(
        notifications
            .iter()
            .any(|n| n["notificationId"] == json!(like_id) && n["type"] == json!("like"))
    );
}

#[tokio::test]
async fn self_engagement_is_silent() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let scream_id = app.scream(&alice, "talking to myself").await;

    app.get(&format!("/scream/{scream_id}/like"), Some(&alice)).await;
    app.post(&format!("/scream/{scream_id}/comment"), Some(&alice), json!({ "body": "me" }))
        .await;
    app.settle().await;

    assert_eq!(app.count_where(Collection::Notifications, "recipient", "alice").await, 0);
}

#[tokio::test]
async fn unliking_withdraws_the_notification() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "maybe").await;

    app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    app.settle().await;
    assert_eq!(app.count_where(Collection::Notifications, "recipient", "alice").await, 1);

    app.get(&format!("/scream/{scream_id}/unlike"), Some(&bob)).await;
    app.settle().await;
    assert_eq!(app.count_where(Collection::Notifications, "recipient", "alice").await, 0);
}

#[tokio::test]
async fn uncommenting_withdraws_the_notification() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "thoughts?").await;

    let (_, comment) = app
        .post(&format!("/scream/{scream_id}/comment"), Some(&bob), json!({ "body": "some" }))
        .await;
    let comment_id = comment["commentId"].as_str().expect("commentId").to_string();
    app.settle().await;
    let notification = app
        .store
        .get(Collection::Notifications, &comment_id)
        .await
        .unwrap()
        .expect("comment notification");
    assert_eq!(notification.get_str("type"), Some("comment"));

    let (status, _) = app.get(&format!("/scream/{comment_id}/uncomment"), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    app.settle().await;
    assert!(app.store.get(Collection::Notifications, &comment_id).await.unwrap().is_none());
    assert!(app.scream_doc(&scream_id).await.is_some());
    assert_eq!(app.count_where(Collection::Notifications, "recipient", "alice").await, 0);
}

#[tokio::test]
async fn mark_read_updates_every_listed_notification() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let first = app.scream(&alice, "one").await;
    let second = app.scream(&alice, "two").await;
    app.get(&format!("/scream/{first}/like"), Some(&bob)).await;
    app.get(&format!("/scream/{second}/like"), Some(&bob)).await;
    app.settle().await;

    let ids = json!([Like::document_id(&first, "bob"), Like::document_id(&second, "bob")]);
    let (status, body) = app.post("/notifications", Some(&alice), ids).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Notifications marked read" }));

    let (_, me) = app.get("/user", Some(&alice)).await;
    let notifications = me["notifications"].as_array().expect("notifications");
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n["read"] == json!(true)));
}

#[tokio::test]
async fn mark_read_with_unknown_id_changes_nothing() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let scream_id = app.scream(&alice, "one").await;
    app.get(&format!("/scream/{scream_id}/like"), Some(&bob)).await;
    app.settle().await;

    let known = Like::document_id(&scream_id, "bob");
    let (status, body) = app
        .post("/notifications", Some(&alice), json!([known, "missing"]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Notification not found" }));

    let doc = app
        .store
        .get(Collection::Notifications, &known)
        .await
        .unwrap()
        .expect("notification");
    assert_eq!(doc.fields["read"], json!(false));
}

#[tokio::test]
async fn only_the_ten_newest_notifications_are_returned() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    for i in 0..12 {
        let created_at = start + Duration::minutes(i);
        app.store
            .set(
                Collection::Notifications,
                &format!("n{i:02}"),
                fields(json!({
                    "recipient": "alice",
                    "sender": "bob",
                    "type": "like",
                    "screamId": "s",
                    "read": false,
                    "createdAt": timestamp::format(&created_at),
                })),
            )
            .await
            .unwrap();
    }

    let (_, me) = app.get("/user", Some(&alice)).await;
    let ids: Vec<&str> = me["notifications"]
        .as_array()
        .expect("notifications")
        .iter()
        .filter_map(|n| n["notificationId"].as_str())
        .collect();
    let expected: Vec<String> = (2..12).rev().map(|i| format!("n{i:02}")).collect();
    assert_eq!(ids, expected);
}
