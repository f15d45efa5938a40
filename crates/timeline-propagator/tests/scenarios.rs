mod common;

use common::{finished, harness};
use task_ledger::TaskLedger;
use social_domain::{can_access, Comment, DomainStubs, FollowGraph, Post, PrivacySettings, PrivacyType, SocialStore,
                    User};

fn owners_of(store: &impl SocialStore, post: &Post) -> Vec<uuid::Uuid> {
  let mut owners: Vec<_> = store.timeline_entries_for_post(&post.id).unwrap().into_iter().map(|e| e.owner).collect();
  owners.sort();
  owners
}

fn sorted(mut ids: Vec<uuid::Uuid>) -> Vec<uuid::Uuid> {
  ids.sort();
  ids
}

#[tokio::test]
async fn public_post_reaches_author_and_followers_once() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();

  let report = finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert!(report.completed);
  assert_eq!(report.attempted, 3);
  assert_eq!(report.succeeded, 3);
  assert_eq!(owners_of(&h.store, &post), sorted(vec![ana.id, beto.id, carla.id]));

  let entry = h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap();
  assert_eq!(entry.post_author, ana.id);
  assert_eq!(entry.time, post.created);
  assert!(!entry.liked);
  assert!(entry.comments.is_empty());

  // Reentregar el mismo evento no duplica nada.
  let again = finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(again.skipped, 3);
  assert_eq!(h.store.timeline_len().unwrap(), 3);
  assert!(h.ledger.live_tasks().unwrap().is_empty());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn followers_but_excludes_listed_follower() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let privacy = PrivacySettings::new(PrivacyType::FollowersBut, vec![carla.id]).unwrap();
  let post = DomainStubs::post(&h.store, &ana.id, privacy).unwrap();

  finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert!(h.store.timeline_entry(&carla.id, &post.id).unwrap().is_none());
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().is_some());
  assert!(h.store.timeline_entry(&ana.id, &post.id).unwrap().is_some());
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn timeline_matches_access_check_for_every_privacy_type() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let dario = DomainStubs::user(&h.store, "dario").unwrap();
  h.store.follow(&ana.id, &beto.id).unwrap();

  let kinds = [PrivacyType::Public,
               PrivacyType::FollowersOnly,
               PrivacyType::FollowingOnly,
               PrivacyType::None,
               PrivacyType::AllBut,
               PrivacyType::FollowersBut,
               PrivacyType::FollowingBut,
               PrivacyType::NoneBut];
  let viewers: Vec<&User> = vec![ana, beto, carla, &dario];
  for kind in kinds {
    let users = if kind.uses_user_list() { vec![carla.id] } else { vec![] };
    let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::new(kind, users).unwrap()).unwrap();
    finished(h.runtime.propagator().on_post_created(&post).await).await;

    for v in viewers.iter() {
      let in_audience = v.id == ana.id || h.store.follows(&v.id, &ana.id).unwrap();
      let expected = in_audience && can_access(&h.store, &v.id, &post).unwrap();
      let present = h.store.timeline_entry(&v.id, &post.id).unwrap().is_some();
      assert_eq!(present, expected, "privacidad {} para {}", kind, v.username);
    }
  }
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn follow_materializes_existing_visible_posts() {
  let h = harness();
  let ana = &h.users[0];
  let dario = DomainStubs::user(&h.store, "dario").unwrap();
  for _ in 0..3 {
    DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  }
  DomainStubs::post(&h.store, &ana.id, PrivacySettings::new(PrivacyType::None, vec![]).unwrap()).unwrap();

  h.store.follow(&dario.id, &ana.id).unwrap();
  let report = finished(h.runtime.propagator().on_user_followed(&dario.id, &ana.id).await).await;
  assert!(report.completed);
  assert_eq!(report.attempted, 4);
  assert_eq!(report.succeeded, 3);
  assert_eq!(h.store.timeline_for(&dario.id, None, 10, 0).unwrap().len(), 3);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn unfollow_retracts_every_entry_of_the_author() {
  let h = harness();
  let (ana, beto) = (&h.users[0], &h.users[1]);
  for _ in 0..2 {
    let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
    finished(h.runtime.propagator().on_post_created(&post).await).await;
  }
  assert_eq!(h.store.timeline_for(&beto.id, None, 10, 0).unwrap().len(), 2);

  h.store.unfollow(&beto.id, &ana.id).unwrap();
  let report = finished(h.runtime.propagator().on_user_unfollowed(&beto.id, &ana.id).await).await;
  assert!(report.completed);
  assert!(h.store.timeline_for(&beto.id, None, 10, 0).unwrap().iter().all(|e| e.post_author != ana.id));
  // El resto de timelines no se toca.
  assert_eq!(h.store.timeline_for(&ana.id, None, 10, 0).unwrap().len(), 2);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn comments_follow_the_entries_of_their_post() {
  let h = harness();
  let (ana, beto) = (&h.users[0], &h.users[1]);
  let privacy = PrivacySettings::new(PrivacyType::NoneBut, vec![beto.id]).unwrap();
  let post = DomainStubs::post(&h.store, &ana.id, privacy).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(owners_of(&h.store, &post), sorted(vec![ana.id, beto.id]));

  let comment = Comment::new(post.id, beto.id, "buena foto").unwrap();
  h.store.save_comment(&comment).unwrap();
  let report = finished(h.runtime.propagator().on_comment_created(&post.id, &comment.id).await).await;
  assert_eq!(report.succeeded, 2);
  for e in h.store.timeline_entries_for_post(&post.id).unwrap() {
    assert_eq!(e.comments, vec![comment.id]);
  }

  h.store.delete_comment(&comment.id).unwrap();
  finished(h.runtime.propagator().on_comment_deleted(&post.id, &comment.id).await).await;
  for e in h.store.timeline_entries_for_post(&post.id).unwrap() {
    assert!(e.comments.is_empty());
  }
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn like_toggle_updates_only_the_actor_entry() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;

  h.store.set_like(&beto.id, &post.id, true).unwrap();
  finished(h.runtime.propagator().on_post_like_toggled(&beto.id, &post.id, true).await).await;
  assert!(h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap().liked);
  assert!(!h.store.timeline_entry(&carla.id, &post.id).unwrap().unwrap().liked);

  h.store.set_like(&beto.id, &post.id, false).unwrap();
  finished(h.runtime.propagator().on_post_like_toggled(&beto.id, &post.id, false).await).await;
  assert!(!h.store.timeline_entry(&beto.id, &post.id).unwrap().unwrap().liked);
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn privacy_change_recomputes_the_audience() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let mut post = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  finished(h.runtime.propagator().on_post_created(&post).await).await;
  assert_eq!(h.store.timeline_len().unwrap(), 3);

  post.privacy = PrivacySettings::new(PrivacyType::AllBut, vec![beto.id]).unwrap();
  h.store.save_post(&post).unwrap();
  let report = finished(h.runtime.propagator().on_post_privacy_changed(&post).await).await;
  assert!(report.completed);
  assert_eq!(owners_of(&h.store, &post), sorted(vec![ana.id, carla.id]));

  post.privacy = PrivacySettings::public();
  h.store.save_post(&post).unwrap();
  finished(h.runtime.propagator().on_post_privacy_changed(&post).await).await;
  assert_eq!(owners_of(&h.store, &post), sorted(vec![ana.id, beto.id, carla.id]));
  h.runtime.shutdown().await;
}

#[tokio::test]
async fn deleting_a_post_or_its_author_clears_the_timelines() {
  let h = harness();
  let (ana, beto, carla) = (&h.users[0], &h.users[1], &h.users[2]);
  let p1 = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  let p2 = DomainStubs::post(&h.store, &ana.id, PrivacySettings::public()).unwrap();
  h.store.follow(&ana.id, &carla.id).unwrap();
  let p3 = DomainStubs::post(&h.store, &carla.id, PrivacySettings::public()).unwrap();
  for p in [&p1, &p2, &p3] {
    finished(h.runtime.propagator().on_post_created(p).await).await;
  }
  assert_eq!(h.store.timeline_len().unwrap(), 8);

  h.store.delete_post(&p1.id).unwrap();
  finished(h.runtime.propagator().on_post_deleted(&p1.id).await).await;
  assert!(h.store.timeline_entries_for_post(&p1.id).unwrap().is_empty());
  assert_eq!(h.store.timeline_len().unwrap(), 5);

  h.store.delete_user(&ana.id).unwrap();
  let report = finished(h.runtime.propagator().on_user_deleted(&ana.id).await).await;
  assert!(report.completed);
  assert!(h.store.timeline_for(&beto.id, None, 10, 0).unwrap().is_empty());
  assert!(h.store.timeline_for(&ana.id, None, 10, 0).unwrap().is_empty());
  let left = h.store.timeline_for(&carla.id, None, 10, 0).unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].post, p3.id);
  h.runtime.shutdown().await;
}
