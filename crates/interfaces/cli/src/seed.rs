//! Question-plan ingestion.
//!
//! Plans are produced upstream; this command loads one from a JSON file,
//! creates the questions and a ready interview around it, and prints the
//! session URL.  It stands in for the planning service during development.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use uuid::Uuid;

use viva_config::AppConfig;
use viva_core::{Interview, InterviewStore as _, Question};

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    candidate_id: Option<Uuid>,
    #[serde(default)]
    cv_analysis_id: Option<Uuid>,
    questions: Vec<PlanQuestion>,
}

#[derive(Debug, Deserialize)]
struct PlanQuestion {
    prompt: String,
    #[serde(default)]
    ideal_answer: Option<String>,
    #[serde(default = "default_difficulty")]
    difficulty: String,
    #[serde(default)]
    skill_tags: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

pub async fn run(config: AppConfig, path: &Path) -> Result<()> {
    let interview_id = seed_plan(&config, path).await?;
    println!(
        "connect: ws://{}/ws?interview_id={interview_id}",
        config.server.bind_addr
    );
    println!(
        "poll:    http://{}/interviews/{interview_id}/summary",
        config.server.bind_addr
    );
    Ok(())
}

async fn seed_plan(config: &AppConfig, path: &Path) -> Result<Uuid> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading plan file {}", path.display()))?;
    let plan: PlanFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing plan file {}", path.display()))?;
    if plan.questions.is_empty() {
        bail!("plan file contains no questions");
    }

    let ports = viva_server::build_ports(config).await?;

    let mut interview = Interview::new(plan.candidate_id.unwrap_or_else(Uuid::new_v4));
    let mut question_ids = Vec::with_capacity(plan.questions.len());
    for planned in plan.questions {
        let mut question = Question::new(planned.prompt);
        question.ideal_answer = planned.ideal_answer;
        question.difficulty = planned.difficulty;
        question.skill_tags = planned.skill_tags;
        question.rationale = planned.rationale;
        question_ids.push(question.id);
        ports.store.insert_question(question).await?;
    }

    interview.assign_plan(question_ids)?;
    interview.mark_ready(plan.cv_analysis_id.unwrap_or_else(Uuid::new_v4))?;
    ports.store.insert_interview(interview.clone()).await?;

    println!(
        "interview {} ready with {} questions",
        interview.id,
        interview.question_ids.len()
    );
    Ok(interview.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use viva_core::InterviewStatus;

    fn write_plan(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("plan.json");
        fs::write(&path, body).unwrap();
        path
    }

    fn mock_config(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.adapters.use_mock_adapters = true;
        config.store.journal_path = dir
            .path()
            .join("journal.jsonl")
            .to_string_lossy()
            .into_owned();
        config
    }

    #[tokio::test]
    async fn a_seeded_plan_replays_from_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plan(
            &dir,
            r#"{
                "questions": [
                    {"prompt": "Explain a B-tree.", "ideal_answer": "balanced pages"},
                    {"prompt": "Explain WAL.", "skill_tags": ["storage"]}
                ]
            }"#,
        );
        let config = mock_config(&dir);
        let interview_id = seed_plan(&config, &path).await.unwrap();

        // A second process (fresh ports) must see the interview via replay.
        let ports = viva_server::build_ports(&config).await.unwrap();
        let interview = ports.store.interview(interview_id).await.unwrap();
        assert_eq!(interview.status, InterviewStatus::Idle);
        assert_eq!(interview.question_ids.len(), 2);
        let first = ports.store.question(interview.question_ids[0]).await.unwrap();
        assert_eq!(first.ideal_answer.as_deref(), Some("balanced pages"));
    }

    #[tokio::test]
    async fn an_empty_plan_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plan(&dir, r#"{"questions": []}"#);
        let config = mock_config(&dir);
        assert!(run(config, &path).await.is_err());
    }
}
