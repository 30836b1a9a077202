//! Question-to-answer scenarios against the CSV-backed `shop` dataset.

use std::fs;
use std::sync::atomic::Ordering;

use ntest::timeout;
use serde_json::json;

use nlq_core::DisplayMode;
use nlq_runtime::{CompositionMethod, Confidence, RequestState};

use super::helpers::{block_on, pipeline, test_config, ScriptedModel};

const COUNT_SQL: &str = "SELECT COUNT(*) AS total_customers FROM shop.customers";
const EMAIL_SQL: &str = "SELECT name, email FROM shop.contacts WHERE name = 'John Doe'";

#[timeout(20000)]
#[test]
fn count_question_is_answered_deterministically() {
    block_on(async {
        let p = pipeline(
            ScriptedModel::new(&[("Count total customers", COUNT_SQL)]),
            test_config(),
        )
        .await;

        let outcome = p.orchestrator.process("Count total customers").await;
        assert_eq!(outcome.final_state, RequestState::Responded);

        let envelope = serde_json::to_value(&outcome.envelope).unwrap();
        assert_eq!(envelope["success"], json!(true));
        assert_eq!(envelope["summary"], json!("The dataset contains a total of 3 customers."));
        assert_eq!(envelope["sql"], json!(COUNT_SQL));
        assert_eq!(envelope["row_count"], json!(1));
        assert_eq!(envelope["data"], json!([{"total_customers": 3}]));

        let translation = outcome.translation.unwrap();
        assert_eq!(translation.target_tables, vec!["customers"]);
        assert_eq!(translation.confidence, Confidence::High);
        assert_eq!(outcome.composition.unwrap().method, CompositionMethod::Deterministic);
        assert_eq!(p.model.summary_calls.load(Ordering::SeqCst), 0);
    });
}

#[timeout(20000)]
#[test]
fn possessive_lookup_names_the_entity() {
    block_on(async {
        let p = pipeline(
            ScriptedModel::new(&[("What is John Doe's email?", EMAIL_SQL)]),
            test_config(),
        )
        .await;

        let envelope = p.orchestrator.handle("What is John Doe's email?").await;
        assert!(envelope.success);
        assert_eq!(
            envelope.summary.as_deref(),
            Some("John Doe's email is john@example.com.")
        );
        assert_eq!(envelope.columns, Some(vec!["name".to_string(), "email".to_string()]));
    });
}

#[timeout(20000)]
#[test]
fn destructive_statement_never_reaches_the_warehouse() {
    block_on(async {
        let p = pipeline(
            ScriptedModel::new(&[
                ("Remove every customer", "DELETE FROM shop.customers"),
                ("Count total customers", COUNT_SQL),
            ]),
            test_config(),
        )
        .await;

        let outcome = p.orchestrator.process("Remove every customer").await;
        assert_eq!(outcome.final_state, RequestState::Errored);
        assert!(!outcome.envelope.success);
        assert!(outcome
            .envelope
            .error
            .as_deref()
            .unwrap()
            .contains("potentially unsafe operations"));
        assert!(outcome.envelope.sql.is_none());

        // Unsafe output is not retried
        assert_eq!(p.model.sql_calls.load(Ordering::SeqCst), 1);

        let envelope = p.orchestrator.handle("Count total customers").await;
        assert_eq!(
            envelope.summary.as_deref(),
            Some("The dataset contains a total of 3 customers.")
        );
    });
}

#[timeout(20000)]
#[test]
fn warehouse_diagnostic_is_returned_with_attempted_sql() {
    block_on(async {
        let bad_sql = "SELECT emial FROM shop.contacts";
        let p = pipeline(
            ScriptedModel::new(&[("List contact emails", bad_sql)]),
            test_config(),
        )
        .await;

        let outcome = p.orchestrator.process("List contact emails").await;
        assert_eq!(outcome.final_state, RequestState::Errored);
        assert_eq!(outcome.translation.unwrap().confidence, Confidence::Low);

        let envelope = outcome.envelope;
        assert!(!envelope.success);
        assert!(envelope.error.as_deref().unwrap().contains("emial"));
        assert_eq!(envelope.sql.as_deref(), Some(bad_sql));
        assert!(envelope.summary.is_none());
    });
}

#[timeout(20000)]
#[test]
fn empty_result_uses_model_summary_then_template() {
    block_on(async {
        let question = "Which customers have revenue above 1000000?";
        let sql = "SELECT customer_name, revenue FROM shop.customers WHERE revenue > 1000000";

        let p = pipeline(
            ScriptedModel::new(&[(question, sql)])
                .with_summary("ANSWER: No customers have revenue above 1,000,000."),
            test_config(),
        )
        .await;
        let outcome = p.orchestrator.process(question).await;
        assert_eq!(
            outcome.envelope.summary.as_deref(),
            Some("No customers have revenue above 1,000,000.")
        );
        assert_eq!(outcome.composition.unwrap().method, CompositionMethod::Model);
        assert_eq!(outcome.envelope.row_count, Some(0));

        // Without a usable model reply the template still answers
        let p = pipeline(ScriptedModel::new(&[(question, sql)]), test_config()).await;
        let outcome = p.orchestrator.process(question).await;
        assert_eq!(outcome.envelope.summary.as_deref(), Some("No matching data found."));
        assert_eq!(outcome.composition.unwrap().method, CompositionMethod::Template);
    });
}

#[timeout(20000)]
#[test]
fn summary_only_mode_hides_query_details() {
    block_on(async {
        let p = pipeline(
            ScriptedModel::new(&[("Count total customers", COUNT_SQL)]),
            test_config(),
        )
        .await;
        p.orchestrator.set_display_mode(DisplayMode::SummaryOnly);

        let envelope = serde_json::to_value(p.orchestrator.handle("Count total customers").await).unwrap();
        let keys: Vec<&String> = envelope.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["success", "query", "summary"]);
    });
}

#[timeout(20000)]
#[test]
fn overlong_question_is_rejected_before_generation() {
    block_on(async {
        let mut config = test_config();
        config.max_question_length = 20;
        let p = pipeline(ScriptedModel::new(&[]), config).await;

        let envelope = p
            .orchestrator
            .handle("How many customers signed up last year?")
            .await;
        assert!(!envelope.success);
        assert_eq!(
            envelope.error.as_deref(),
            Some("Query too long. Maximum length is 20 characters (got 39).")
        );
        assert_eq!(p.model.sql_calls.load(Ordering::SeqCst), 0);
    });
}

#[timeout(20000)]
#[test]
fn refresh_publishes_new_tables_for_later_requests() {
    block_on(async {
        let p = pipeline(
            ScriptedModel::new(&[
                ("Count total orders", "SELECT COUNT(*) AS total_orders FROM shop.orders"),
                ("Count total customers", COUNT_SQL),
            ]),
            test_config(),
        )
        .await;
        let catalog = p.orchestrator.catalog().clone();
        assert_eq!(catalog.current_version(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        fs::write(&path, "order_id,customer_id\n1,1\n2,1\n").unwrap();
        p.warehouse.register_csv("orders", &path).await.unwrap();

        // Requests in flight keep using the pinned snapshot
        let (before, refreshed) = tokio::join!(
            p.orchestrator.handle("Count total customers"),
            catalog.refresh()
        );
        assert!(before.success);
        let snapshot = refreshed.unwrap();
        assert_eq!(snapshot.version, 2);
        assert!(snapshot.table("orders").is_some());

        let envelope = p.orchestrator.handle("Count total orders").await;
        assert_eq!(
            envelope.summary.as_deref(),
            Some("The dataset contains a total of 2 orders.")
        );
        let prompts = p.model.prompts.lock().unwrap();
        assert!(prompts.last().unwrap().contains("shop.orders"));
    });
}
