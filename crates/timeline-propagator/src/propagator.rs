use crate::dispatch::{Dispatcher, FanoutHandle};
use crate::errors::{PropagationError, Result};
use crate::event::TimelineEvent;
use log::{debug, error, warn};
use social_domain::{CommentId, Post, PostId, StoreConnector, UserId};
use std::sync::Arc;
use task_ledger::LedgerError;

/// Punto de entrada de los handlers externos.
///
/// Cada `on_*` se llama después de persistir el cambio en la fuente de
/// verdad: registra la tarea en el ledger y encola el fan-out sin esperar a
/// que termine. Devuelve `None` si la propagación está desactivada.
pub struct Propagator<C: StoreConnector> {
    dispatcher: Arc<Dispatcher<C>>,
    debug: bool,
}

impl<C: StoreConnector> Clone for Propagator<C> {
    fn clone(&self) -> Self {
        Propagator { dispatcher: self.dispatcher.clone(), debug: self.debug }
    }
}

impl<C: StoreConnector> Propagator<C> {
    pub fn new(dispatcher: Arc<Dispatcher<C>>, debug: bool) -> Self {
        Propagator { dispatcher, debug }
    }

    pub fn is_enabled(&self) -> bool {
        !self.debug
    }

    pub async fn on_post_created(&self, post: &Post) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::PostCreated { post: post.clone() }).await
    }

    pub async fn on_post_privacy_changed(&self, post: &Post) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::PostPrivacyChanged { post: post.clone() }).await
    }

    pub async fn on_user_followed(&self, actor: &UserId, target: &UserId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::UserFollowed { actor: *actor, target: *target }).await
    }

    pub async fn on_user_unfollowed(&self, actor: &UserId, target: &UserId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::UserUnfollowed { actor: *actor, target: *target }).await
    }

    pub async fn on_post_deleted(&self, post: &PostId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::PostDeleted { post: *post }).await
    }

    pub async fn on_post_like_toggled(&self, actor: &UserId, post: &PostId, liked: bool) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::PostLikeToggled { actor: *actor, post: *post, liked }).await
    }

    pub async fn on_comment_created(&self, post: &PostId, comment: &CommentId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::CommentCreated { post: *post, comment: *comment }).await
    }

    pub async fn on_comment_deleted(&self, post: &PostId, comment: &CommentId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::CommentDeleted { post: *post, comment: *comment }).await
    }

    pub async fn on_user_deleted(&self, user: &UserId) -> Result<Option<FanoutHandle>> {
        self.propagate(TimelineEvent::UserDeleted { user: *user }).await
    }

    /// Espera a que terminen todos los fan-outs encolados hasta ahora.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await
    }

    async fn propagate(&self, event: TimelineEvent) -> Result<Option<FanoutHandle>> {
        let kind = event.kind();
        if self.debug {
            debug!("propagación desactivada; se omite {}", kind);
            return Ok(None);
        }

        let spec = event.task_spec();
        let ledger = self.dispatcher.core().ledger().clone();
        let task = tokio::task::spawn_blocking(move || ledger.push_task(&spec))
                   .await
                   .map_err(|e| PropagationError::Dispatch(format!("registro de {} abortado: {}", kind, e)))?;
        if task.is_empty() {
            error!("no se pudo registrar la tarea {}; el evento no se propaga", kind);
            return Err(PropagationError::Ledger(LedgerError::Storage(format!("no se pudo registrar la tarea {}",
                                                                             kind))));
        }

        match self.dispatcher.submit(event, task).await {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                warn!("tarea {}:{} registrada pero no encolada: {}", kind, task, e);
                Err(e)
            }
        }
    }
}
