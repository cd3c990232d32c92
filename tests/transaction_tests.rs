mod common;

use std::time::Duration;

use common::{CallLog, Outcome, ScriptedClient, config, router};
use serde_json::json;
use sqlx_pg_router::{
   Action, Error, IsolationLevel, QueryContext, Role, TransactionState, TxOptions,
};

fn primary_only(primary: ScriptedClient) -> sqlx_pg_router::Router<ScriptedClient> {
   router(&config(3, Duration::ZERO), primary, None, None)
}

#[tokio::test]
async fn test_transaction_state_machine() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));
   let ctx = QueryContext::new();

   let mut tx = router.begin(&ctx).await.unwrap();
   assert_eq!(tx.state(), TransactionState::Open);

   tx.exec(&ctx, "INSERT INTO t VALUES ($1)", &[json!(1)])
      .await
      .unwrap();
   let row = tx.query_row(&ctx, "SELECT 1", &[]).await.unwrap();
   assert!(row.is_some());

   // Not allowed inside a transaction
   assert!(matches!(
      tx.begin(&ctx).await.unwrap_err(),
      Error::NestedTransaction
   ));
   assert!(matches!(
      tx.begin_tx(&ctx, &TxOptions::default()).await.unwrap_err(),
      Error::NestedTransaction
   ));
   assert!(matches!(
      tx.ping(&ctx).await.unwrap_err(),
      Error::PingInTransaction
   ));

   // Closing the handle neither commits nor rolls back
   tx.close(&ctx).await.unwrap();
   assert_eq!(tx.state(), TransactionState::Open);

   tx.commit(&ctx).await.unwrap();
   assert_eq!(tx.state(), TransactionState::Committed);

   assert!(matches!(
      tx.commit(&ctx).await.unwrap_err(),
      Error::TransactionAlreadyFinalized
   ));
   assert!(matches!(
      tx.rollback(&ctx).await.unwrap_err(),
      Error::TransactionAlreadyFinalized
   ));
   assert!(matches!(
      tx.exec(&ctx, "INSERT INTO t VALUES (2)", &[]).await.unwrap_err(),
      Error::TransactionAlreadyFinalized
   ));
   assert!(matches!(
      tx.begin(&ctx).await.unwrap_err(),
      Error::NestedTransaction
   ));

   assert_eq!(
      log.calls(),
      [
         "primary.begin",
         "primary.tx.exec",
         "primary.tx.query_row",
         "primary.tx.commit"
      ]
   );
}

#[tokio::test]
async fn test_rollback_is_terminal() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));
   let ctx = QueryContext::new();

   let options = TxOptions::default().with_isolation_level(IsolationLevel::Serializable);
   let mut tx = router.begin_tx(&ctx, &options).await.unwrap();
   tx.rollback(&ctx).await.unwrap();
   assert_eq!(tx.state(), TransactionState::RolledBack);

   assert!(matches!(
      tx.commit(&ctx).await.unwrap_err(),
      Error::TransactionAlreadyFinalized
   ));
}

#[tokio::test]
async fn test_begin_is_never_retried() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log).then(Outcome::Refused));

   let err = router.begin(&QueryContext::new()).await.unwrap_err();
   assert!(matches!(
      err,
      Error::Client {
         role: Role::Primary,
         action: Action::Begin,
         ..
      }
   ));
   assert_eq!(log.calls(), ["primary.begin"]);
   assert_eq!(router.metrics().total_retries, 0);
}

#[tokio::test]
async fn test_scoped_transaction_commits_on_success() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));

   let affected = router
      .execute_in_transaction_default(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            let first = tx.exec(ctx, "UPDATE a SET x = 1", &[]).await?;
            let second = tx.exec(ctx, "UPDATE b SET x = 1", &[]).await?;
            Ok(first.rows_affected + second.rows_affected)
         })
      })
      .await
      .unwrap();

   assert_eq!(affected, 2);
   assert_eq!(
      log.calls(),
      [
         "primary.begin",
         "primary.tx.exec",
         "primary.tx.exec",
         "primary.tx.commit"
      ]
   );
}

#[tokio::test]
async fn test_scoped_transaction_rolls_back_on_error() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log).tx_exec_with(Outcome::Fatal));

   let err = router
      .execute_in_transaction(
         &QueryContext::new(),
         &TxOptions::default(),
         |tx, ctx| {
            Box::pin(async move {
               tx.exec(ctx, "INSERT INTO t VALUES (1)", &[]).await?;
               Ok(())
            })
         },
      )
      .await
      .unwrap_err();

   // The function's own error, untouched
   assert!(matches!(
      err,
      Error::Client {
         role: Role::Primary,
         action: Action::Exec,
         ..
      }
   ));
   assert_eq!(
      log.calls(),
      ["primary.begin", "primary.tx.exec", "primary.tx.rollback"]
   );
}

#[tokio::test]
async fn test_failed_rollback_keeps_the_original_error() {
   let log = CallLog::default();
   let router = primary_only(
      ScriptedClient::new("primary", &log)
         .tx_exec_with(Outcome::Fatal)
         .rollback_with(Outcome::Refused),
   );

   let err = router
      .execute_in_transaction_default(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            tx.exec(ctx, "INSERT INTO t VALUES (1)", &[]).await?;
            Ok(())
         })
      })
      .await
      .unwrap_err();

   let Error::TransactionRollbackFailed {
      transaction_error,
      rollback_error,
   } = &err
   else {
      panic!("expected TransactionRollbackFailed, got {err:?}");
   };
   assert!(matches!(
      **transaction_error,
      Error::Client {
         action: Action::Exec,
         ..
      }
   ));
   assert!(matches!(
      **rollback_error,
      Error::Client {
         action: Action::Rollback,
         ..
      }
   ));
   assert!(matches!(err.root(), Error::Client { action: Action::Exec, .. }));
   assert!(err.to_string().contains("rollback also failed"));
}

#[tokio::test]
async fn test_application_error_is_returned_as_is() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));

   let err = router
      .execute_in_transaction_default::<(), _>(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            tx.exec(ctx, "UPDATE accounts SET balance = balance - 100", &[])
               .await?;
            Err(Error::InvalidConfiguration("insufficient funds".into()))
         })
      })
      .await
      .unwrap_err();

   assert!(matches!(err, Error::InvalidConfiguration(ref msg) if msg == "insufficient funds"));
   assert_eq!(log.count("primary.tx.rollback"), 1);
   assert_eq!(log.count("primary.tx.commit"), 0);
}

#[tokio::test]
async fn test_finalized_inside_closure_is_not_finalized_again() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));

   router
      .execute_in_transaction_default(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            tx.exec(ctx, "INSERT INTO t VALUES (1)", &[]).await?;
            tx.commit(ctx).await
         })
      })
      .await
      .unwrap();
   assert_eq!(log.count("primary.tx.commit"), 1);

   // Rolled back inside, then an error: no second rollback
   let err = router
      .execute_in_transaction_default::<(), _>(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            tx.rollback(ctx).await?;
            Err(Error::InvalidConfiguration("abandoned".into()))
         })
      })
      .await
      .unwrap_err();
   assert!(matches!(err, Error::InvalidConfiguration(_)));
   assert_eq!(log.count("primary.tx.rollback"), 1);
   assert_eq!(log.count("primary.tx.commit"), 1);
}

#[tokio::test]
async fn test_commit_failure_is_transaction_failed() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log).commit_with(Outcome::Refused));

   let err = router
      .execute_in_transaction_default(&QueryContext::new(), |tx, ctx| {
         Box::pin(async move {
            tx.exec(ctx, "INSERT INTO t VALUES (1)", &[]).await?;
            Ok(())
         })
      })
      .await
      .unwrap_err();

   let Error::TransactionFailed(source) = &err else {
      panic!("expected TransactionFailed, got {err:?}");
   };
   assert!(matches!(
      **source,
      Error::Client {
         action: Action::Commit,
         ..
      }
   ));
   assert_eq!(err.error_code(), "TRANSACTION_FAILED");
}

#[tokio::test]
async fn test_begin_failure_is_transaction_failed() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log).then(Outcome::Refused));

   let err = router
      .execute_in_transaction_default(&QueryContext::new(), |_tx, _ctx| {
         Box::pin(async move { Ok(()) })
      })
      .await
      .unwrap_err();

   assert!(matches!(err, Error::TransactionFailed(_)));
   assert_eq!(log.calls(), ["primary.begin"]);
}

#[tokio::test]
async fn test_transaction_statements_are_counted() {
   let log = CallLog::default();
   let router = primary_only(ScriptedClient::new("primary", &log));
   let ctx = QueryContext::new();

   let mut tx = router.begin(&ctx).await.unwrap();
   tx.query(&ctx, "SELECT 1", &[]).await.unwrap();
   tx.commit(&ctx).await.unwrap();

   // begin, query, commit
   assert_eq!(router.metrics().total_queries, 3);
}
