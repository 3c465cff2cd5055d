use std::time::Duration;

use chrono::Utc;

use rota_adapters::persistence::sqlite::SqliteDb;
use rota_app::manager::ScheduleManager;
use rota_ports::outbound::JobQueue;

const IDLE_POLL: Duration = Duration::from_secs(1);
const RETRY_DELAY: chrono::Duration = chrono::Duration::seconds(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://rota.db".into());
    let db = SqliteDb::new(&database_url).await?;
    tracing::info!(%database_url, "connected");

    let queue = db.clone();
    let manager = ScheduleManager::new(db.clone(), db);

    let seeded = manager.seed_all(Utc::now()).await?;
    tracing::info!(seeded, "startup seeding complete");

    loop {
        let now = Utc::now();
        let jobs = match queue.claim_due(now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "failed to claim due jobs");
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
        };

        if jobs.is_empty() {
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        }

        for job in jobs {
            match manager.run(&job.schedule_id, now).await {
                Ok(()) => {
                    if let Err(e) = queue.mark_done(&job.id).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to ack job");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        schedule_id = %job.schedule_id,
                        job_id = %job.id,
                        error = %e,
                        "schedule evaluation failed"
                    );
                    if let Err(e) = queue.mark_failed(&job.id, now + RETRY_DELAY).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to reschedule job");
                    }
                }
            }
        }
    }
}
