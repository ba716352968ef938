//! Delivery-planning scenarios over an in-memory database.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{delivery_env, rss, TestItem};
use feedrelay::{ComparisonRegistry, DateChecks, DeliveryRequest, FieldStore};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn delivered_ids(result: &feedrelay::DeliveryResult) -> Vec<&str> {
    result.articles_to_deliver.iter().map(|a| a.id()).collect()
}

#[tokio::test]
async fn test_first_poll_seeds_without_delivering() {
    let env = delivery_env().await;
    let xml = rss(&[
        TestItem::new("a", "A"),
        TestItem::new("b", "B"),
        TestItem::new("c", "C"),
    ]);

    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", xml.as_str()))
        .await
        .unwrap();

    assert_eq!(result.all_articles.len(), 3);
    assert!(result.articles_to_deliver.is_empty());
    assert!(env.field_store.has_prior_articles("feed-1").await.unwrap());
}

#[tokio::test]
async fn test_second_poll_delivers_only_the_new_article() {
    let env = delivery_env().await;
    let first = rss(&[
        TestItem::new("a", "A"),
        TestItem::new("b", "B"),
        TestItem::new("c", "C"),
    ]);
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", first.as_str()))
        .await
        .unwrap();

    // A new item appears at the top of the feed
    let second = rss(&[
        TestItem::new("d", "D"),
        TestItem::new("a", "A"),
        TestItem::new("b", "B"),
        TestItem::new("c", "C"),
    ]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", second.as_str()))
        .await
        .unwrap();

    assert_eq!(delivered_ids(&result), vec!["d"]);
    assert_eq!(result.all_articles.len(), 4);
}

#[tokio::test]
async fn test_rerun_on_identical_xml_delivers_nothing() {
    let env = delivery_env().await;
    let first = rss(&[TestItem::new("a", "A")]);
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", first.as_str()))
        .await
        .unwrap();

    let second = rss(&[TestItem::new("b", "B"), TestItem::new("a", "A")]);
    let request = DeliveryRequest::new("feed-1", second.as_str());
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&request)
        .await
        .unwrap();
    assert_eq!(delivered_ids(&result), vec!["b"]);

    // The very same XML again: everything is already recorded
    let rerun = env
        .service
        .get_articles_to_deliver_from_xml(&request)
        .await
        .unwrap();
    assert!(rerun.articles_to_deliver.is_empty());
}

#[tokio::test]
async fn test_deliveries_are_oldest_first() {
    let env = delivery_env().await;
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new(
            "feed-1",
            rss(&[TestItem::new("a", "A")]),
        ))
        .await
        .unwrap();

    // Feed lists newest first: e is newer than d
    let update = rss(&[
        TestItem::new("e", "E"),
        TestItem::new("d", "D"),
        TestItem::new("a", "A"),
    ]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", update.as_str()))
        .await
        .unwrap();

    assert_eq!(delivered_ids(&result), vec!["d", "e"]);
}

#[tokio::test]
async fn test_comparison_activation_delivers_nothing() {
    let env = delivery_env().await;
    let xml = rss(&[TestItem::new("a", "Hello")]);
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", xml.as_str()))
        .await
        .unwrap();

    // First pass mentioning the comparison activates and backfills it
    let result = env
        .service
        .get_articles_to_deliver_from_xml(
            &DeliveryRequest::new("feed-1", xml.as_str())
                .with_blocking_comparisons(strings(&["title"])),
        )
        .await
        .unwrap();

    assert!(result.articles_to_deliver.is_empty());
    let activated = env
        .registry
        .find("feed-1", &strings(&["title"]))
        .await
        .unwrap();
    assert_eq!(activated, strings(&["title"]));
}

#[tokio::test]
async fn test_blocking_comparison_suppresses_repeated_title() {
    let env = delivery_env().await;
    let seed = rss(&[TestItem::new("a", "Hello")]);
    let request = |xml: &str| {
        DeliveryRequest::new("feed-1", xml).with_blocking_comparisons(strings(&["title"]))
    };

    // Seed, then activate the title comparison
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", seed.as_str()))
        .await
        .unwrap();
    env.service
        .get_articles_to_deliver_from_xml(&request(&seed))
        .await
        .unwrap();

    // Two new articles: one repeats a delivered title, one is fresh
    let update = rss(&[
        TestItem::new("f", "Fresh"),
        TestItem::new("e", "Hello"),
        TestItem::new("a", "Hello"),
    ]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&request(&update))
        .await
        .unwrap();

    assert_eq!(delivered_ids(&result), vec!["f"]);
}

#[tokio::test]
async fn test_new_articles_pass_when_no_blocking_comparisons() {
    let env = delivery_env().await;
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new(
            "feed-1",
            rss(&[TestItem::new("a", "Hello")]),
        ))
        .await
        .unwrap();

    // Same title as a stored article, but no blocking comparisons are
    // requested, so the new article passes
    let update = rss(&[TestItem::new("e", "Hello"), TestItem::new("a", "Hello")]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", update.as_str()))
        .await
        .unwrap();

    assert_eq!(delivered_ids(&result), vec!["e"]);
}

#[tokio::test]
async fn test_passing_comparison_redelivers_on_changed_description() {
    let env = delivery_env().await;
    let v1 = rss(&[TestItem::new("a", "A").with_description("first description")]);
    let request = |xml: &str| {
        DeliveryRequest::new("feed-1", xml).with_passing_comparisons(strings(&["description"]))
    };

    // Seed, then activate the description comparison
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", v1.as_str()))
        .await
        .unwrap();
    let activation = env
        .service
        .get_articles_to_deliver_from_xml(&request(&v1))
        .await
        .unwrap();
    assert!(activation.articles_to_deliver.is_empty());

    // The same article mutates its description
    let v2 = rss(&[TestItem::new("a", "A").with_description("second description")]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&request(&v2))
        .await
        .unwrap();
    assert_eq!(delivered_ids(&result), vec!["a"]);

    // Re-running with the same XML does not re-deliver
    let rerun = env
        .service
        .get_articles_to_deliver_from_xml(&request(&v2))
        .await
        .unwrap();
    assert!(rerun.articles_to_deliver.is_empty());
}

#[tokio::test]
async fn test_unactivated_passing_comparison_delivers_nothing() {
    let env = delivery_env().await;
    let v1 = rss(&[TestItem::new("a", "A").with_description("first")]);
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", v1.as_str()))
        .await
        .unwrap();

    // The comparison is being activated in this very pass; the changed
    // description is backfilled, not delivered
    let v2 = rss(&[TestItem::new("a", "A").with_description("second")]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(
            &DeliveryRequest::new("feed-1", v2.as_str())
                .with_passing_comparisons(strings(&["description"])),
        )
        .await
        .unwrap();
    assert!(result.articles_to_deliver.is_empty());
}

#[tokio::test]
async fn test_date_checks_drop_old_articles() {
    let env = delivery_env().await;
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new(
            "feed-1",
            rss(&[TestItem::new("a", "A")]),
        ))
        .await
        .unwrap();

    let recent = (Utc::now() - ChronoDuration::hours(1)).to_rfc2822();
    let update = rss(&[
        TestItem::new("new-recent", "Recent").with_pubdate(&recent),
        TestItem::new("new-old", "Old").with_pubdate("Mon, 01 Jun 2020 12:00:00 GMT"),
        TestItem::new("new-dateless", "Dateless"),
        TestItem::new("a", "A"),
    ]);
    let checks = DateChecks {
        // One day
        old_article_date_diff_ms_threshold: Some(86_400_000),
        date_placeholder_references: None,
    };
    let result = env
        .service
        .get_articles_to_deliver_from_xml(
            &DeliveryRequest::new("feed-1", update.as_str()).with_date_checks(checks),
        )
        .await
        .unwrap();

    // The old article and the dateless article are both dropped
    assert_eq!(delivered_ids(&result), vec!["new-recent"]);
}

#[tokio::test]
async fn test_empty_feed_returns_empty_result() {
    let env = delivery_env().await;
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", rss(&[])))
        .await
        .unwrap();

    assert!(result.all_articles.is_empty());
    assert!(result.articles_to_deliver.is_empty());
    assert!(!env.field_store.has_prior_articles("feed-1").await.unwrap());
}

#[tokio::test]
async fn test_feeds_do_not_share_dedup_state() {
    let env = delivery_env().await;
    let xml = rss(&[TestItem::new("a", "A")]);
    env.service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", xml.as_str()))
        .await
        .unwrap();

    // The same article on another feed is that feed's seed pass
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-2", xml.as_str()))
        .await
        .unwrap();
    assert!(result.articles_to_deliver.is_empty());
    assert!(env.field_store.has_prior_articles("feed-2").await.unwrap());
}

#[tokio::test]
async fn test_delete_info_for_feed_resets_to_seed_pass() {
    let env = delivery_env().await;
    let xml = rss(&[TestItem::new("a", "A")]);
    env.service
        .get_articles_to_deliver_from_xml(
            &DeliveryRequest::new("feed-1", xml.as_str())
                .with_blocking_comparisons(strings(&["title"])),
        )
        .await
        .unwrap();

    env.service.delete_info_for_feed("feed-1").await.unwrap();

    assert!(!env.field_store.has_prior_articles("feed-1").await.unwrap());
    assert!(env
        .registry
        .find("feed-1", &strings(&["title"]))
        .await
        .unwrap()
        .is_empty());

    // The next poll seeds again instead of flooding
    let update = rss(&[TestItem::new("b", "B"), TestItem::new("a", "A")]);
    let result = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", update.as_str()))
        .await
        .unwrap();
    assert!(result.articles_to_deliver.is_empty());
}

#[tokio::test]
async fn test_invalid_feed_propagates() {
    let env = delivery_env().await;
    let err = env
        .service
        .get_articles_to_deliver_from_xml(&DeliveryRequest::new("feed-1", "<html></html>"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_feed());
}
