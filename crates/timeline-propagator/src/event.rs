use chrono::SubsecRound;
use serde::{Deserialize, Serialize};
use social_domain::{CommentId, Post, PostId, UserId};
use task_ledger::{TaskKind, TaskSpec};

/// Evento de dominio que dispara una propagación de timelines.
///
/// Los handlers externos persisten primero el cambio en la fuente de
/// verdad y después entregan el evento al propagador.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEvent {
    PostCreated { post: Post },
    PostPrivacyChanged { post: Post },
    UserFollowed { actor: UserId, target: UserId },
    UserUnfollowed { actor: UserId, target: UserId },
    PostDeleted { post: PostId },
    PostLikeToggled { actor: UserId, post: PostId, liked: bool },
    CommentCreated { post: PostId, comment: CommentId },
    CommentDeleted { post: PostId, comment: CommentId },
    UserDeleted { user: UserId },
}

impl TimelineEvent {
    /// Carga de la tarea que registra este evento en el ledger.
    pub fn task_spec(&self) -> TaskSpec {
        match self {
            TimelineEvent::PostCreated { post } => TaskSpec::CreatePost { post: post.id,
                                                                          author: post.author,
                                                                          created: post.created.trunc_subsecs(3),
                                                                          refresh: false },
            TimelineEvent::PostPrivacyChanged { post } => TaskSpec::CreatePost { post: post.id,
                                                                                 author: post.author,
                                                                                 created: post.created.trunc_subsecs(3),
                                                                                 refresh: true },
            TimelineEvent::UserFollowed { actor, target } => {
                TaskSpec::FollowUser { follower: *actor, followed: *target }
            }
            TimelineEvent::UserUnfollowed { actor, target } => {
                TaskSpec::UnfollowUser { follower: *actor, unfollowed: *target }
            }
            TimelineEvent::PostDeleted { post } => TaskSpec::PostDelete { post: *post },
            TimelineEvent::PostLikeToggled { actor, post, liked } => {
                TaskSpec::PostLike { user: *actor, post: *post, liked: *liked }
            }
            TimelineEvent::CommentCreated { post, comment } => TaskSpec::CreateComment { post: *post, comment: *comment },
            TimelineEvent::CommentDeleted { post, comment } => TaskSpec::DeleteComment { post: *post, comment: *comment },
            TimelineEvent::UserDeleted { user } => TaskSpec::DeleteUser { user: *user },
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.task_spec().kind()
    }

    /// Reconstruye el evento a partir de una tarea registrada. Las tareas
    /// `create_post` necesitan el post actual (`None` si ya no existe, en
    /// cuyo caso no hay nada que reejecutar); las marcadas como `refresh`
    /// vuelven a ser un cambio de privacidad.
    pub fn from_spec(spec: &TaskSpec, current_post: Option<Post>) -> Option<TimelineEvent> {
        let ev = match spec {
            TaskSpec::CreatePost { refresh: false, .. } => TimelineEvent::PostCreated { post: current_post? },
            TaskSpec::CreatePost { refresh: true, .. } => TimelineEvent::PostPrivacyChanged { post: current_post? },
            TaskSpec::FollowUser { follower, followed } => {
                TimelineEvent::UserFollowed { actor: *follower, target: *followed }
            }
            TaskSpec::UnfollowUser { follower, unfollowed } => {
                TimelineEvent::UserUnfollowed { actor: *follower, target: *unfollowed }
            }
            TaskSpec::PostDelete { post } => TimelineEvent::PostDeleted { post: *post },
            TaskSpec::PostLike { user, post, liked } => {
                TimelineEvent::PostLikeToggled { actor: *user, post: *post, liked: *liked }
            }
            TaskSpec::CreateComment { post, comment } => TimelineEvent::CommentCreated { post: *post, comment: *comment },
            TaskSpec::DeleteComment { post, comment } => TimelineEvent::CommentDeleted { post: *post, comment: *comment },
            TaskSpec::DeleteUser { user } => TimelineEvent::UserDeleted { user: *user },
        };
        Some(ev)
    }
}
