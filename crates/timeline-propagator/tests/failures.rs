mod common;

use common::{finished, harness, harness_with, test_config};
use social_domain::{Comment, DomainStubs, InMemorySocialStore, PrivacySettings, PrivacyType, SocialStore};
use std::sync::Arc;
use std::time::Duration;
use task_ledger::{FailedOp, InMemoryTaskLedger, TaskKind, TaskLedger};
use timeline_propagator::{FanoutRuntime, PropagationError, PropagatorConfig, TimelineEvent};

#[tokio::test]
async fn single_target_failure_is_recorded_and_resolved_later() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  h.store.fail_timeline_writes_for(beto.id);
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();

  let report = finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(report.succeeded, 2);
  assert_eq!(report.failed, 1);
  assert!(!report.completed);
  assert!(h.store.timeline_entry(&carla.id, &post.id).unwrap().is_some());

  let live = h.ledger.live_tasks().unwrap();
  assert_eq!(live.len(), 1);
  let fails = h.ledger.failed_ops(TaskKind::CreatePost, &live[0].id).unwrap();
  assert_eq!(fails.len(), 1);
  assert_eq!(fails[0].op, FailedOp::Materialize { owner: beto.id, post: post.id });

  h.store.clear_faults();
  let r = h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(r.retried, 1);
  assert_eq!(r.solved, 1);
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().is_some());
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  assert_eq!(h.ledger.backend().key_count(), 0);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn persistent_failure_is_buried_after_max_attempts() {
  let h = harness();
  let (ana, beto) = (&h.users[0], &h.users[1]);
  h.store.fail_timeline_writes_for(beto.id);
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;

  let resolver = h.runtime.resolver();
  let first = resolver.resolve_once().await.unwrap();
  assert_eq!(first.rescheduled, 1);
  let second = resolver.resolve_once().await.unwrap();
  assert_eq!(second.rescheduled, 1);
  let third = resolver.resolve_once().await.unwrap();
  assert_eq!(third.buried, 1);

  assert!(h.ledger.live_tasks().unwrap().is_empty());
  let dead = h.ledger.dead_ops().unwrap();
  assert_eq!(dead.len(), 1);
  assert_eq!(dead[0].attempts, 3);
  assert!(dead[0].last_error.is_some());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn orphan_task_replay_never_duplicates_entries() {
  let mut cfg = test_config();
  cfg.resolver.stale_task_after = Duration::ZERO;
  let h = harness_with(cfg);
  let ana = &h.users[0];
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(h.store.timeline_len().unwrap(), 3);

  // Tarea registrada cuyo fan-out nunca llegó a ejecutarse.
  let orphan = h.ledger.push_task(&TimelineEvent::PostCreated { post: post.clone() }.task_spec());
  assert!(!orphan.is_empty());

  let r = h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(r.replayed, 1);
  assert_eq!(h.store.timeline_len().unwrap(), 3);
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn interrupted_privacy_change_is_replayed_as_a_refresh() {
  let mut cfg = test_config();
  cfg.resolver.stale_task_after = Duration::ZERO;
  let h = harness_with(cfg);
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let mut post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().is_some());

  // El cambio quedó registrado pero el worker murió antes de la purga.
  post.privacy = PrivacySettings::new(PrivacyType::AllBut, vec![beto.id]).unwrap();
  h.store.save_post(&post).unwrap();
  let task = h.ledger.push_task(&TimelineEvent::PostPrivacyChanged { post: post.clone() }.task_spec());
  assert!(!task.is_empty());

  let r = h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(r.replayed, 1);
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().is_none());
  assert!(h.store.timeline_entry(&ana.id, &post.id).unwrap().is_some());
  assert!(h.store.timeline_entry(&carla.id, &post.id).unwrap().is_some());
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[test]
fn debug_mode_disables_propagation() {
  tokio_test::block_on(async {
    let mut cfg = test_config();
    cfg.debug = true;
    let h = harness_with(cfg);
    let post = DomainStubs::post(&h.store, &h.users[0].id, PrivacySettings::public()).unwrap();

    let handle = h.runtime.propagator().on_post_created(&post).await.unwrap();
    assert!(handle.is_none());
    assert!(!h.runtime.propagator().is_enabled());
    h.runtime.propagator().wait_idle().await;
    assert!(h.ledger.live_tasks().unwrap().is_empty());
    assert_eq!(h.store.timeline_len().unwrap(), 0);
    h.runtime.shutdown().await;
  });
}

#[tokio::test]
async fn like_given_before_materialization_is_seeded() {
  let h = harness();
  let ana = &h.users[0];
  let dario = DomainStubs::user(&h.store, "dario").unwrap();
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  h.store.set_like(&dario.id, &post.id, true).unwrap();

  h.store.follow(&dario.id, &ana.id).unwrap();
  finished(h.runtime.propagator().on_user_followed(&dario.id, &ana.id).await).await;
  assert!(h.store.timeline_entry(&dario.id, &post.id).unwrap().unwrap().liked);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn expired_deadline_leaves_targets_for_the_resolver() {
  let mut cfg = test_config();
  cfg.fanout_timeout = Duration::ZERO;
  let h = harness_with(cfg);
  let post = DomainStubs::post(&h.store, &h.users[0].id, PrivacySettings::public()).unwrap();

  let report = finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(report.timed_out, 3);
  assert_eq!(h.store.timeline_len().unwrap(), 0);

  let r = h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(r.solved, 3);
  assert_eq!(h.store.timeline_len().unwrap(), 3);
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn failed_bulk_delete_is_retried_as_one_operation() {
  let h = harness();
  let ana = &h.users[0];
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;

  h.store.fail_bulk_deletes(true);
  h.store.delete_post(&post.id).unwrap();
  let report = finished(h.runtime.propagator().on_post_deleted(&post.id).await).await;
  assert_eq!(report.failed, 1);
  let live = h.ledger.live_tasks().unwrap();
  let fails = h.ledger.failed_ops(TaskKind::PostDelete, &live[0].id).unwrap();
  assert_eq!(fails[0].op, FailedOp::PurgePost { post: post.id });

  h.store.clear_faults();
  let r = h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(r.solved, 1);
  assert!(h.store.timeline_entries_for_post(&post.id).unwrap().is_empty());
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn failed_comment_append_targets_only_that_entry() {
  let h = harness();
  let (ana, beto) = (&h.users[0], &h.users[1]);
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;
  let entry = h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap();

  h.store.fail_entry_updates_for(entry.id);
  let comment = Comment::new(post.id, ana.id, "gracias").unwrap();
  h.store.save_comment(&comment).unwrap();
  let report = finished(h.runtime.propagator().on_comment_created(&post.id, &comment.id).await).await;
  assert_eq!(report.succeeded, 2);
  assert_eq!(report.failed, 1);
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap().comments.is_empty());

  h.store.clear_faults();
  h.runtime.resolver().resolve_once().await.unwrap();
  assert_eq!(h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap().comments, vec![comment.id]);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn ledger_failure_is_reported_and_nothing_is_dispatched() {
  let h = harness();
  h.ledger.backend().fail_hash_writes(true);
  let post = DomainStubs::post(&h.store, &h.users[0].id, PrivacySettings::public()).unwrap();

  let res = h.runtime.propagator().on_post_created(&post).await;
  assert!(matches!(res, Err(PropagationError::Ledger(_))));
  h.runtime.propagator().wait_idle().await;
  assert_eq!(h.store.timeline_len().unwrap(), 0);
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn follow_unfollow_bursts_converge_to_the_last_write() {
  let h = harness();
  let ana = &h.users[0];
  let dario = DomainStubs::user(&h.store, "dario").unwrap();
  for _ in 0..3 {
    DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  }
  let propagator = h.runtime.propagator();

  for round in 0..10 {
    h.store.follow(&dario.id, &ana.id).unwrap();
    let a = propagator.on_user_followed(&dario.id, &ana.id).await.unwrap();
    h.store.unfollow(&dario.id, &ana.id).unwrap();
    let b = propagator.on_user_unfollowed(&dario.id, &ana.id).await.unwrap();
    let refollow = round % 2 == 0;
    if refollow {
      h.store.follow(&dario.id, &ana.id).unwrap();
      drop(propagator.on_user_followed(&dario.id, &ana.id).await.unwrap());
    }
    drop((a, b));
    propagator.wait_idle().await;

    let feed = h.store.timeline_for(&dario.id, None, 10, 0).unwrap();
    if refollow {
      assert_eq!(feed.len(), 3, "ronda {}", round);
    } else {
      assert!(feed.is_empty(), "ronda {}", round);
    }
  }
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn shutdown_keeps_queued_tasks_for_the_resolver() {
  let (store, users) = DomainStubs::sample_store().unwrap();
  let ledger = Arc::new(InMemoryTaskLedger::in_memory());
  let runtime: FanoutRuntime<InMemorySocialStore> =
    FanoutRuntime::start(store.clone(), ledger.clone(), PropagatorConfig { workers: 1, ..test_config() }).unwrap();
  let post = DomainStubs::post(&store, &users[0].id, PrivacySettings::public()).unwrap();
  let handle = runtime.propagator().on_post_created(&post).await.unwrap().unwrap();
  let task = handle.task();
  runtime.shutdown().await;

  // O terminó antes de detenerse, o sigue vivo en el ledger.
  let live = ledger.live_tasks().unwrap();
  if store.timeline_len().unwrap() == 3 {
    assert!(live.is_empty());
  } else {
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, task);
  }
}
