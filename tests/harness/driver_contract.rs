//! Macro-generated conformance suite for `Driver<Article>` implementations
//!
//! The `driver_contract_tests!` macro generates a test module validating any
//! driver against the shared contract: lookups that miss return nothing,
//! criteria and sorting behave the same on every backend, pagination slices
//! lazily and staged writes only become visible on commit.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod harness;
//!
//! use harness::*;
//! use resource::storage::InMemoryDriver;
//!
//! driver_contract_tests!(InMemoryDriver::<Article>::new(metadata()));
//! ```
//!
//! # Generated Tests
//!
//! ## Lookups
//! - `test_create_assigns_id` / `test_find_by_id` / `test_find_by_slug`
//! - `test_find_one_by_no_match` / `test_find_by_no_match`
//! - `test_find_by_string_and_number_criteria`
//! - `test_find_by_list_criteria` / `test_find_by_empty_list_matches_nothing`
//! - `test_find_by_null_criteria`
//! - `test_find_by_sorting_and_limit`
//!
//! ## Pagination
//! - `test_paginator_slices_pages` / `test_paginator_page_past_end`
//!
//! ## Writes
//! - `test_update_persists` / `test_update_unsaved_fails`
//! - `test_delete_then_find_is_empty` / `test_delete_twice_fails`
//! - `test_rollback_discards_writes` / `test_staged_writes_visible_after_commit`

/// Generate the driver conformance suite
///
/// `$factory` must evaluate to a fresh, empty driver implementing
/// `Driver<Article>`. It is re-evaluated for every test and may `.await`.
#[macro_export]
macro_rules! driver_contract_tests {
    ($factory:expr) => {
        mod driver_contract_tests {
            use super::*;
            use resource::core::driver::Driver;
            use resource::core::error::PersistenceError;
            use resource::core::query::{Criteria, Sorting, parse_sort};
            use resource::core::resource::{Resource, ResourceIdentifier};
            use serde_json::json;

            fn criteria(value: serde_json::Value) -> Criteria {
                value.as_object().cloned().unwrap()
            }

            fn titles(articles: &[Article]) -> Vec<&str> {
                articles.iter().map(|a| a.title.as_str()).collect()
            }

            async fn seeded(driver: &impl Driver<Article>) -> Vec<Article> {
                let mut created = Vec::new();
                for (i, (title, slug)) in [
                    ("Alpha", "alpha"),
                    ("Bravo", "bravo"),
                    ("Charlie", "charlie"),
                    ("Delta", "delta"),
                    ("Echo", "echo"),
                ]
                .into_iter()
                .enumerate()
                {
                    let mut a = article(title, slug, i as i64 + 1);
                    if i % 2 == 0 {
                        a.status = "published".to_string();
                    }
                    if i == 4 {
                        a.summary = Some("last one".to_string());
                    }
                    created.push(driver.create(a).await.unwrap());
                }
                created
            }

            // ==============================================================
            // Lookups
            // ==============================================================

            #[tokio::test]
            async fn test_create_assigns_id() {
                let driver = $factory;
                let fresh = driver.create_new();
                assert!(fresh.id().is_none());

                let created = driver.create(article("Alpha", "alpha", 1)).await.unwrap();
                assert!(created.id.is_some());
                assert_eq!(created.title, "Alpha");
            }

            #[tokio::test]
            async fn test_find_by_id() {
                let driver = $factory;
                let created = driver.create(article("Alpha", "alpha", 1)).await.unwrap();
                let id = created.id.unwrap();

                let found = driver
                    .find_one_by(&ResourceIdentifier::Id(id).criteria())
                    .await
                    .unwrap();
                assert_eq!(found, Some(created));
            }

            #[tokio::test]
            async fn test_find_by_slug() {
                let driver = $factory;
                seeded(&driver).await;

                let found = driver
                    .find_one_by(&ResourceIdentifier::Slug("charlie".into()).criteria())
                    .await
                    .unwrap()
                    .expect("charlie should exist");
                assert_eq!(found.title, "Charlie");
            }

            #[tokio::test]
            async fn test_find_one_by_no_match() {
                let driver = $factory;
                seeded(&driver).await;

                let found = driver
                    .find_one_by(&ResourceIdentifier::Id(uuid::Uuid::new_v4()).criteria())
                    .await
                    .unwrap();
                assert!(found.is_none());
            }

            #[tokio::test]
            async fn test_find_by_no_match() {
                let driver = $factory;
                seeded(&driver).await;

                let found = driver
                    .find_by(&criteria(json!({"status": "archived"})), &Sorting::new(), None)
                    .await
                    .unwrap();
                assert!(found.is_empty());
            }

            #[tokio::test]
            async fn test_find_by_string_and_number_criteria() {
                let driver = $factory;
                seeded(&driver).await;

                let published = driver
                    .find_by(
                        &criteria(json!({"status": "published"})),
                        &parse_sort("rank"),
                        None,
                    )
                    .await
                    .unwrap();
                assert_eq!(titles(&published), vec!["Alpha", "Charlie", "Echo"]);

                let ranked = driver
                    .find_by(&criteria(json!({"rank": 2})), &Sorting::new(), None)
                    .await
                    .unwrap();
                assert_eq!(titles(&ranked), vec!["Bravo"]);
            }

            #[tokio::test]
            async fn test_find_by_list_criteria() {
                let driver = $factory;
                seeded(&driver).await;

                let found = driver
                    .find_by(
                        &criteria(json!({"slug": ["bravo", "delta", "zulu"]})),
                        &parse_sort("rank:desc"),
                        None,
                    )
                    .await
                    .unwrap();
                assert_eq!(titles(&found), vec!["Delta", "Bravo"]);
            }

            #[tokio::test]
            async fn test_find_by_empty_list_matches_nothing() {
                let driver = $factory;
                seeded(&driver).await;

                let found = driver
                    .find_by(&criteria(json!({"slug": []})), &Sorting::new(), None)
                    .await
                    .unwrap();
                assert!(found.is_empty());
            }

            #[tokio::test]
            async fn test_find_by_null_criteria() {
                let driver = $factory;
                seeded(&driver).await;

                let without_summary = driver
                    .find_by(&criteria(json!({"summary": null})), &parse_sort("rank"), None)
                    .await
                    .unwrap();
                assert_eq!(without_summary.len(), 4);
                assert!(without_summary.iter().all(|a| a.summary.is_none()));
            }

            #[tokio::test]
            async fn test_find_by_sorting_and_limit() {
                let driver = $factory;
                seeded(&driver).await;

                let top = driver
                    .find_by(&Criteria::new(), &parse_sort("rank:desc"), Some(2))
                    .await
                    .unwrap();
                assert_eq!(titles(&top), vec!["Echo", "Delta"]);

                let by_status_then_title = driver
                    .find_by(&Criteria::new(), &parse_sort("status:asc,title:desc"), None)
                    .await
                    .unwrap();
                assert_eq!(
                    titles(&by_status_then_title),
                    vec!["Delta", "Bravo", "Echo", "Charlie", "Alpha"]
                );
            }

            // ==============================================================
            // Pagination
            // ==============================================================

            #[tokio::test]
            async fn test_paginator_slices_pages() {
                let driver = $factory;
                seeded(&driver).await;

                let mut paginator = driver
                    .create_paginator(&Criteria::new(), &parse_sort("rank"))
                    .await
                    .unwrap();
                paginator.set_max_per_page(2);

                paginator.set_current_page(1);
                let first = paginator.current_page_results().await.unwrap();
                assert_eq!(titles(&first.data), vec!["Alpha", "Bravo"]);
                assert_eq!(first.pagination.total, 5);
                assert_eq!(first.pagination.total_pages, 3);
                assert!(first.pagination.has_next);
                assert!(!first.pagination.has_prev);

                paginator.set_current_page(3);
                let last = paginator.current_page_results().await.unwrap();
                assert_eq!(titles(&last.data), vec!["Echo"]);
                assert!(!last.pagination.has_next);
            }

            #[tokio::test]
            async fn test_paginator_page_past_end() {
                let driver = $factory;
                seeded(&driver).await;

                let mut paginator = driver
                    .create_paginator(&criteria(json!({"status": "published"})), &parse_sort("rank"))
                    .await
                    .unwrap();
                paginator.set_max_per_page(2).set_current_page(9);

                let page = paginator.current_page_results().await.unwrap();
                assert!(page.data.is_empty());
                assert_eq!(page.pagination.total, 3);
            }

            // ==============================================================
            // Writes
            // ==============================================================

            #[tokio::test]
            async fn test_update_persists() {
                let driver = $factory;
                let mut created = driver.create(article("Alpha", "alpha", 1)).await.unwrap();
                created.title = "Alpha, revised".to_string();
                created.summary = Some("now with a summary".to_string());

                let updated = driver.update(created.clone()).await.unwrap();
                assert_eq!(updated, created);

                let found = driver
                    .find_one_by(&ResourceIdentifier::Id(created.id.unwrap()).criteria())
                    .await
                    .unwrap();
                assert_eq!(found, Some(created));
            }

            #[tokio::test]
            async fn test_update_unsaved_fails() {
                let driver = $factory;
                let result = driver.update(article("Ghost", "ghost", 1)).await;
                assert!(matches!(result, Err(PersistenceError::Missing { .. })));

                let mut unknown = article("Ghost", "ghost", 1);
                unknown.id = Some(uuid::Uuid::new_v4());
                assert!(driver.update(unknown).await.is_err());
            }

            #[tokio::test]
            async fn test_delete_then_find_is_empty() {
                let driver = $factory;
                let created = seeded(&driver).await;
                let victim = &created[1];

                driver.delete(victim).await.unwrap();

                let found = driver
                    .find_one_by(&ResourceIdentifier::Id(victim.id.unwrap()).criteria())
                    .await
                    .unwrap();
                assert!(found.is_none());
                let rest = driver
                    .find_by(&Criteria::new(), &Sorting::new(), None)
                    .await
                    .unwrap();
                assert_eq!(rest.len(), 4);
            }

            #[tokio::test]
            async fn test_delete_twice_fails() {
                let driver = $factory;
                let created = driver.create(article("Alpha", "alpha", 1)).await.unwrap();
                driver.delete(&created).await.unwrap();
                assert!(driver.delete(&created).await.is_err());
            }

            #[tokio::test]
            async fn test_rollback_discards_writes() {
                let driver = $factory;
                let existing = driver.create(article("Alpha", "alpha", 1)).await.unwrap();

                let mut tx = driver.begin().await.unwrap();
                let staged = tx.create(article("Bravo", "bravo", 2)).await.unwrap();
                assert!(staged.id.is_some());
                tx.delete(&existing).await.unwrap();
                tx.rollback().await.unwrap();

                let all = driver
                    .find_by(&Criteria::new(), &Sorting::new(), None)
                    .await
                    .unwrap();
                assert_eq!(all, vec![existing]);
            }

            #[tokio::test]
            async fn test_staged_writes_visible_after_commit() {
                let driver = $factory;

                let mut tx = driver.begin().await.unwrap();
                let staged = tx.create(article("Bravo", "bravo", 2)).await.unwrap();
                let lookup = ResourceIdentifier::Id(staged.id.unwrap()).criteria();
                assert!(driver.find_one_by(&lookup).await.unwrap().is_none());

                tx.commit().await.unwrap();
                assert_eq!(driver.find_one_by(&lookup).await.unwrap(), Some(staged));
            }
        }
    };
}
