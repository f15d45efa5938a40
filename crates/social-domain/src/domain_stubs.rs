use crate::{DomainError, InMemorySocialStore, Post, PrivacySettings, SocialStore, User, UserId};

pub struct DomainStubs;

impl DomainStubs {
  /// Registra un usuario por nombre en `store`.
  pub fn user<S: SocialStore + ?Sized>(store: &S, name: &str) -> Result<User, DomainError> {
    let user = User::new(name)?;
    store.save_user(&user)?;
    Ok(user)
  }

  /// Crea y guarda un post de `author` con la privacidad indicada.
  pub fn post<S: SocialStore + ?Sized>(store: &S,
                                       author: &UserId,
                                       privacy: PrivacySettings)
                                       -> Result<Post, DomainError> {
    let post = Post::new(*author, privacy);
    store.save_post(&post)?;
    Ok(post)
  }

  /// Almacén en memoria con tres usuarios (`ana`, `beto`, `carla`) donde
  /// `beto` y `carla` siguen a `ana`.
  pub fn sample_store() -> Result<(InMemorySocialStore, Vec<User>), DomainError> {
    let store = InMemorySocialStore::new();
    let ana = Self::user(&store, "ana")?;
    let beto = Self::user(&store, "beto")?;
    let carla = Self::user(&store, "carla")?;
    store.follow(&beto.id, &ana.id)?;
    store.follow(&carla.id, &ana.id)?;
    Ok((store, vec![ana, beto, carla]))
  }
}
