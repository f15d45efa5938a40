use chrono::Utc;
use social_persistence::Database;
use task_ledger::{FailedOp, KvTaskLedger, LedgerBackend, TaskKind, TaskLedger, TaskSpec};
use uuid::Uuid;

fn temp_ledger() -> KvTaskLedger<social_persistence::DieselLedgerBackend> {
  let tmp_path = std::env::temp_dir().join(format!("ledger_test_{}.db", Uuid::new_v4()));
  let db = Database::new(tmp_path.to_str().unwrap()).expect("db");
  KvTaskLedger::new(db.ledger_backend())
}

#[test]
fn backend_behaves_like_sets_and_hashes() {
  let ledger = temp_ledger();
  let b = ledger.backend();
  assert!(b.sadd("s", "a").unwrap());
  assert!(!b.sadd("s", "a").unwrap());
  b.sadd("s", "b").unwrap();
  assert_eq!(b.smembers("s").unwrap(), vec!["a".to_string(), "b".to_string()]);
  assert!(b.srem("s", "a").unwrap());
  assert!(!b.srem("s", "a").unwrap());

  b.hset("h", &[("x".into(), "1".into()), ("y".into(), "2".into())]).unwrap();
  b.hset("h", &[("x".into(), "3".into())]).unwrap();
  assert_eq!(b.hget("h", "x").unwrap().as_deref(), Some("3"));
  assert_eq!(b.hgetall("h").unwrap().len(), 2);
  assert!(b.hdel("h", "y").unwrap());
  b.del("h").unwrap();
  b.del("s").unwrap();
  assert!(b.hgetall("h").unwrap().is_empty());
  assert!(b.smembers("s").unwrap().is_empty());
}

#[test]
fn durable_ledger_lifecycle() {
  let ledger = temp_ledger();
  assert!(ledger.push_task_args("create_post", &[]).is_empty());
  assert!(ledger.live_tasks().unwrap().is_empty());

  let spec = TaskSpec::CreatePost { post: Uuid::new_v4(), author: Uuid::new_v4(), created: Utc::now(), refresh: false };
  let task = ledger.push_task(&spec);
  let fail = ledger.push_fail(TaskKind::CreatePost,
                              &task,
                              &FailedOp::Materialize { owner: Uuid::new_v4(), post: Uuid::new_v4() });
  let live = ledger.live_tasks().unwrap();
  assert_eq!(live.len(), 1);
  assert_eq!(live[0].kind(), TaskKind::CreatePost);

  ledger.failed_op_solved(TaskKind::CreatePost, &task, &fail).unwrap();
  assert!(ledger.live_tasks().unwrap().is_empty());
  assert!(ledger.backend().hgetall(&task_ledger::keys::task(TaskKind::CreatePost, &task)).unwrap().is_empty());
  ledger.task_done(TaskKind::CreatePost, &task).unwrap();
}
