pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use tokio::sync::mpsc;

use crate::core::config::{load_session_meta, Settings};
use crate::core::telemetry;
use crate::services::exam_api::HttpExamApi;
use crate::services::exam_controller::ExamController;
use crate::tasks::console;
use crate::tasks::runtime::{self, ExamServices};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let meta = load_session_meta()?;
    let api = HttpExamApi::from_settings(&settings)?;

    tracing::info!(
        session_id = %meta.session_id,
        server = settings.server().base_url.as_str(),
        environment = settings.runtime().environment.as_str(),
        questions = meta.question_ids.len(),
        "Exam runtime starting"
    );

    let controller = ExamController::new(meta, settings.exam().clone());

    let (input_tx, inputs) = mpsc::channel(64);
    console::spawn_stdin_reader(input_tx);
    println!("{}", console::HELP);

    let (leave_tx, leaves) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            core::shutdown::leave_signal().await;
            if leave_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let outcome =
        runtime::run(controller, ExamServices::from_api(api), inputs, leaves, console::print_event)
            .await?;

    println!("{}", console::describe_outcome(outcome));
    if let Some(snapshot) = core::metrics::render() {
        eprintln!("{snapshot}");
    }

    Ok(())
}
