// access.rs
//
// Evaluación de privacidad compartida por la ruta de lectura y por la
// propagación de timelines. Existe una única implementación: si la
// propagación evaluara la visibilidad de otra forma, el timeline
// desnormalizado mostraría posts ocultos o escondería posts visibles.
use crate::{DomainError, FollowGraph, Post, PrivacyType, UserId};

/// Determina si `viewer` puede ver `post` según el estado actual del grafo.
///
/// El autor siempre puede ver su propio post. Para el resto:
/// - `Public`: todos.
/// - `FollowersOnly`: el viewer sigue al autor.
/// - `FollowingOnly`: el autor sigue al viewer.
/// - `None`: nadie.
/// - `AllBut` / `NoneBut`: lista explícita de exclusión / inclusión.
/// - `FollowersBut` / `FollowingBut`: la regla de seguimiento y además el
///   viewer no está en la lista.
pub fn can_access<G: FollowGraph + ?Sized>(graph: &G, viewer: &UserId, post: &Post) -> Result<bool, DomainError> {
  if &post.author == viewer {
    return Ok(true);
  }

  let listed = post.privacy.lists(viewer);
  let allowed = match post.privacy.kind {
    PrivacyType::Public => true,
    PrivacyType::None => false,
    PrivacyType::FollowersOnly => graph.follows(viewer, &post.author)?,
    PrivacyType::FollowingOnly => graph.follows(&post.author, viewer)?,
    PrivacyType::AllBut => !listed,
    PrivacyType::NoneBut => listed,
    PrivacyType::FollowersBut => !listed && graph.follows(viewer, &post.author)?,
    PrivacyType::FollowingBut => !listed && graph.follows(&post.author, viewer)?,
  };
  Ok(allowed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::PrivacySettings;
  use std::collections::HashSet;
  use uuid::Uuid;

  struct Edges(HashSet<(UserId, UserId)>);

  impl FollowGraph for Edges {
    fn follows(&self, from: &UserId, to: &UserId) -> Result<bool, DomainError> {
      Ok(self.0.contains(&(*from, *to)))
    }
  }

  fn post(author: UserId, kind: PrivacyType, users: Vec<UserId>) -> Post {
    Post::new(author, PrivacySettings::new(kind, users).unwrap())
  }

  #[test]
  fn author_always_sees_own_post() {
    let a = Uuid::new_v4();
    let g = Edges(HashSet::new());
    assert!(can_access(&g, &a, &post(a, PrivacyType::None, vec![])).unwrap());
  }

  #[test]
  fn follow_direction_matters() {
    let (a, v) = (Uuid::new_v4(), Uuid::new_v4());
    // v sigue a a, pero a no sigue a v
    let g = Edges([(v, a)].into_iter().collect());
    assert!(can_access(&g, &v, &post(a, PrivacyType::FollowersOnly, vec![])).unwrap());
    assert!(!can_access(&g, &v, &post(a, PrivacyType::FollowingOnly, vec![])).unwrap());
  }

  #[test]
  fn list_types() {
    let (a, v, w) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let g = Edges([(v, a), (w, a)].into_iter().collect());
    assert!(!can_access(&g, &v, &post(a, PrivacyType::AllBut, vec![v])).unwrap());
    assert!(can_access(&g, &w, &post(a, PrivacyType::AllBut, vec![v])).unwrap());
    assert!(can_access(&g, &v, &post(a, PrivacyType::NoneBut, vec![v])).unwrap());
    assert!(!can_access(&g, &w, &post(a, PrivacyType::NoneBut, vec![v])).unwrap());
    assert!(!can_access(&g, &v, &post(a, PrivacyType::FollowersBut, vec![v])).unwrap());
    assert!(can_access(&g, &w, &post(a, PrivacyType::FollowersBut, vec![v])).unwrap());
  }

  #[test]
  fn following_but_requires_author_to_follow_viewer() {
    let (a, v, w) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let g = Edges([(a, v)].into_iter().collect());
    let p = post(a, PrivacyType::FollowingBut, vec![w]);
    assert!(can_access(&g, &v, &p).unwrap());
    assert!(!can_access(&g, &w, &p).unwrap());
  }

  #[test]
  fn public_and_none() {
    let (a, v) = (Uuid::new_v4(), Uuid::new_v4());
    let g = Edges(HashSet::new());
    assert!(can_access(&g, &v, &post(a, PrivacyType::Public, vec![])).unwrap());
    assert!(!can_access(&g, &v, &post(a, PrivacyType::None, vec![])).unwrap());
  }
}
