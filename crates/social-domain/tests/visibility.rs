use social_domain::{can_access, DomainStubs, PrivacySettings, PrivacyType, SocialStore};

#[test]
fn read_path_access_follows_store_graph() {
  let (store, users) = DomainStubs::sample_store().unwrap();
  let (ana, beto) = (&users[0], &users[1]);
  let outsider = DomainStubs::user(&store, "dario").unwrap();

  let followers = DomainStubs::post(&store, &ana.id, PrivacySettings::new(PrivacyType::FollowersOnly, vec![]).unwrap())
    .unwrap();
  assert!(can_access(&store, &beto.id, &followers).unwrap());
  assert!(!can_access(&store, &outsider.id, &followers).unwrap());

  // Dejar de seguir cambia la visibilidad en la siguiente evaluación.
  store.unfollow(&beto.id, &ana.id).unwrap();
  assert!(!can_access(&store, &beto.id, &followers).unwrap());
  assert!(can_access(&store, &ana.id, &followers).unwrap());
}

#[test]
fn excluded_follower_cannot_see_post() {
  let (store, users) = DomainStubs::sample_store().unwrap();
  let (ana, beto, carla) = (&users[0], &users[1], &users[2]);
  let privacy = PrivacySettings::new(PrivacyType::FollowersBut, vec![carla.id]).unwrap();
  let post = DomainStubs::post(&store, &ana.id, privacy).unwrap();

  assert!(can_access(&store, &beto.id, &post).unwrap());
  assert!(!can_access(&store, &carla.id, &post).unwrap());
}

#[test]
fn feed_is_ordered_newest_first() {
  use chrono::{Duration, Utc};
  use social_domain::TimelineEntry;

  let (store, users) = DomainStubs::sample_store().unwrap();
  let (ana, beto) = (&users[0], &users[1]);
  let now = Utc::now();
  for age in [3, 1, 2] {
    let post = social_domain::Post::new(ana.id, PrivacySettings::public()).with_created(now - Duration::minutes(age));
    store.save_post(&post).unwrap();
    store.insert_timeline_entry(&TimelineEntry::for_post(beto.id, &post, false)).unwrap();
  }

  let feed = store.timeline_for(&beto.id, None, 10, 0).unwrap();
  assert_eq!(feed.len(), 3);
  assert!(feed.windows(2).all(|w| w[0].time >= w[1].time));

  let newer = store.timeline_for(&beto.id, Some(now - Duration::seconds(150)), 10, 0).unwrap();
  assert_eq!(newer.len(), 2);
  assert_eq!(store.timeline_for(&beto.id, None, 10, 2).unwrap().len(), 1);
}
