use log::{info, warn};
use social_domain::{Comment, DomainStubs, PrivacySettings, PrivacyType, SocialStore, StoreConnector, User};
use social_persistence::Database;
use std::error::Error;
use std::sync::Arc;
use task_ledger::{KvTaskLedger, TaskLedger};
use timeline_propagator::{FanoutHandle, FanoutRuntime, PropagatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Demo del fan-out de timelines sobre SQLite.
///
/// Crea unos usuarios y posts, propaga cada evento como lo haría un handler
/// tras persistir el cambio e imprime los feeds resultantes. La base de
/// datos sale de `TIMELINE_DB_URL` / `DATABASE_URL`; sin ellas se usa un
/// archivo temporal. `RUST_LOG=debug` muestra cada sub-operación.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_target(false))
                                  .with(tracing_subscriber::EnvFilter::try_from_default_env()
                                          .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
                                  .init();

    let db = match social_persistence::new_from_env() {
        Ok(db) => db,
        Err(e) => {
            let path = std::env::temp_dir().join("timeline_demo.db");
            warn!("{}; usando {}", e, path.display());
            Database::new(&path.to_string_lossy())?
        }
    };
    let config = PropagatorConfig::from_env()?;
    let connector = db.social_store();
    let ledger = Arc::new(KvTaskLedger::new(db.ledger_backend()));
    let runtime = FanoutRuntime::start(connector.clone(), ledger.clone(), config)?;
    let p = runtime.propagator();
    if !p.is_enabled() {
        warn!("TIMELINE_DEBUG activo: los eventos no se propagan");
    }

    // Sesión de los "handlers": escriben la fuente de verdad y avisan al
    // propagador.
    let s = connector.open()?;
    let ana = DomainStubs::user(&s, "ana")?;
    let beto = DomainStubs::user(&s, "beto")?;
    let carla = DomainStubs::user(&s, "carla")?;
    for (follower, followed) in [(&beto, &ana), (&carla, &ana), (&ana, &beto)] {
        s.follow(&follower.id, &followed.id)?;
        report("follow", p.on_user_followed(&follower.id, &followed.id).await?).await?;
    }

    let public = DomainStubs::post(&s, &ana.id, PrivacySettings::public())?;
    report("post público", p.on_post_created(&public).await?).await?;
    let private = DomainStubs::post(&s, &ana.id, PrivacySettings::new(PrivacyType::FollowersBut, vec![carla.id])?)?;
    report("post sin carla", p.on_post_created(&private).await?).await?;
    let reply = DomainStubs::post(&s, &beto.id, PrivacySettings::new(PrivacyType::FollowersOnly, vec![])?)?;
    report("post de beto", p.on_post_created(&reply).await?).await?;

    let comment = Comment::new(public.id, beto.id, "¡buen post!")?;
    s.save_comment(&comment)?;
    report("comentario", p.on_comment_created(&public.id, &comment.id).await?).await?;
    s.set_like(&carla.id, &public.id, true)?;
    report("like", p.on_post_like_toggled(&carla.id, &public.id, true).await?).await?;

    s.unfollow(&carla.id, &ana.id)?;
    report("unfollow", p.on_user_unfollowed(&carla.id, &ana.id).await?).await?;

    p.wait_idle().await;
    for user in [&ana, &beto, &carla] {
        print_feed(&s, user)?;
    }

    let pending = ledger.live_tasks()?;
    info!("tareas pendientes en el ledger: {}", pending.len());
    runtime.shutdown().await;
    Ok(())
}

async fn report(label: &str, handle: Option<FanoutHandle>) -> Result<(), Box<dyn Error>> {
    if let Some(h) = handle {
        let r = h.wait().await?;
        info!("{}: {}", label, serde_json::to_string(&r)?);
    }
    Ok(())
}

fn print_feed<S: SocialStore>(s: &S, user: &User) -> Result<(), Box<dyn Error>> {
    let feed = s.timeline_for(&user.id, None, 20, 0)?;
    println!("\n== feed de {} ({} entradas) ==", user.username, feed.len());
    for e in feed {
        println!("{} | post {} de {} | liked={} | comentarios={}",
                 e.time.format("%H:%M:%S%.3f"),
                 e.post,
                 e.post_author,
                 e.liked,
                 e.comments.len());
    }
    Ok(())
}
