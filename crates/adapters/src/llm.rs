use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use viva_core::{
    AnswerAssessment, LanguageModel, PortError, RecommendationInput, RecommendationSet,
};

use crate::{classify_status, classify_transport};

/// Language model over an OpenAI-compatible `/chat/completions` endpoint.
///
/// The API key is read from the environment at construction time and never
/// logged; requests carry it as a bearer token.
#[derive(Debug, Clone)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLanguageModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, PortError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let mut request = self.client.post(endpoint).json(&payload);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let body: serde_json::Value = serde_json::from_str(&body)
            .map_err(|err| PortError::Permanent(format!("malformed completion body: {err}")))?;
        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| PortError::Permanent("completion response missing content".to_string()))
    }
}

/// Pull the first JSON object out of a model reply, tolerating code fences
/// and prose around it.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

const EVALUATOR_SYSTEM: &str = "You are a strict technical interviewer grading one answer. \
Respond with a single JSON object and nothing else, with keys: raw_score (0-100), \
completeness (0-1), relevance (0-1), sentiment (one word), reasoning (string), \
strengths (array of strings), weaknesses (array of strings), \
gaps (object with concepts: array of strings, confirmed: boolean). \
Set gaps.confirmed to true only when you are certain the listed concepts are missing.";

const RECOMMENDER_SYSTEM: &str = "You are an interview coach writing a debrief. \
Respond with a single JSON object and nothing else, with keys: strengths, weaknesses, \
study_topics, technique_tips, each an array of short strings.";

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate_question(
        &self,
        skill_tags: &[String],
        difficulty: &str,
    ) -> Result<String, PortError> {
        let user = format!(
            "Write one {difficulty} technical interview question covering: {}. \
             Reply with the question text only.",
            skill_tags.join(", "),
        );
        self.chat("You are a technical interviewer.", &user).await
    }

    async fn evaluate_answer(
        &self,
        question: &str,
        ideal_answer: Option<&str>,
        answer: &str,
    ) -> Result<AnswerAssessment, PortError> {
        let user = match ideal_answer {
            Some(ideal) => format!(
                "Question:\n{question}\n\nReference answer:\n{ideal}\n\nCandidate answer:\n{answer}"
            ),
            None => format!("Question:\n{question}\n\nCandidate answer:\n{answer}"),
        };
        let reply = self.chat(EVALUATOR_SYSTEM, &user).await?;
        let object = extract_json_object(&reply)
            .ok_or_else(|| PortError::Permanent("evaluation reply contained no JSON".to_string()))?;
        let mut assessment: AnswerAssessment = serde_json::from_str(object)
            .map_err(|err| PortError::Permanent(format!("evaluation reply schema: {err}")))?;
        assessment.raw_score = assessment.raw_score.clamp(0.0, 100.0);
        assessment.completeness = assessment.completeness.clamp(0.0, 1.0);
        assessment.relevance = assessment.relevance.clamp(0.0, 1.0);
        Ok(assessment)
    }

    async fn generate_followup_question(
        &self,
        parent_question: &str,
        answer_text: &str,
        missing_concepts: &[String],
        order: u8,
    ) -> Result<String, PortError> {
        let user = format!(
            "Original question:\n{parent_question}\n\nCandidate answer:\n{answer_text}\n\n\
             The answer did not cover: {}. Write follow-up question number {order} \
             targeting exactly those concepts. Reply with the question text only.",
            missing_concepts.join(", "),
        );
        self.chat("You are a technical interviewer probing knowledge gaps.", &user)
            .await
    }

    async fn generate_recommendations(
        &self,
        input: &RecommendationInput,
    ) -> Result<RecommendationSet, PortError> {
        let evaluations: Vec<serde_json::Value> = input
            .evaluations
            .iter()
            .map(|evaluation| {
                json!({
                    "final_score": evaluation.final_score,
                    "strengths": evaluation.strengths,
                    "weaknesses": evaluation.weaknesses,
                    "reasoning": evaluation.reasoning,
                })
            })
            .collect();
        let user = format!(
            "Overall score {:.1} (theory {:.1}, speaking {:.1}).\n\
             Per-answer evaluations:\n{}\n\
             Gap progression:\n{}",
            input.overall_score,
            input.theoretical_avg,
            input.speaking_avg,
            serde_json::to_string(&evaluations).unwrap_or_default(),
            serde_json::to_string(&input.gap_progression).unwrap_or_default(),
        );
        let reply = self.chat(RECOMMENDER_SYSTEM, &user).await?;

        // A transport or HTTP failure above is a real error; a reply that is
        // not the requested JSON degrades to empty lists.
        match extract_json_object(&reply).and_then(|object| serde_json::from_str(object).ok()) {
            Some(set) => Ok(set),
            None => {
                warn!("recommendation reply was not JSON; returning empty recommendation set");
                Ok(RecommendationSet::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_extracted_from_fenced_replies() {
        let reply = "Here you go:\n```json\n{\"raw_score\": 70}\n```\nHope that helps.";
        assert_eq!(extract_json_object(reply), Some("{\"raw_score\": 70}"));
    }

    #[test]
    fn bare_json_is_extracted_verbatim() {
        let reply = r#"{"strengths": []}"#;
        assert_eq!(extract_json_object(reply), Some(reply));
    }

    #[test]
    fn prose_without_json_yields_none() {
        assert_eq!(extract_json_object("I cannot answer that."), None);
    }

    #[test]
    fn assessment_schema_decodes_with_gaps() {
        let object = r#"{
            "raw_score": 55.0,
            "completeness": 0.5,
            "relevance": 0.8,
            "sentiment": "neutral",
            "reasoning": "covers basics only",
            "strengths": ["definition"],
            "weaknesses": ["no indexing discussion"],
            "gaps": {"concepts": ["indexing"], "confirmed": true}
        }"#;
        let assessment: AnswerAssessment = serde_json::from_str(object).unwrap();
        assert!(assessment.gaps.confirmed);
        assert_eq!(assessment.gaps.concepts, vec!["indexing"]);
    }

    #[test]
    fn recommendation_set_tolerates_missing_keys() {
        let set: RecommendationSet = serde_json::from_str(r#"{"strengths": ["calm"]}"#).unwrap();
        assert_eq!(set.strengths, vec!["calm"]);
        assert!(set.study_topics.is_empty());
        assert!(set.technique_tips.is_empty());
    }
}
