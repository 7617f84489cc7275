//! Prompt-driven backend for the delegated classifier
//!
//! Renders the categorization rules and the batch into a single prompt, hands
//! it to any text generator (local or hosted language model) and parses the
//! JSON object out of the reply.

use async_trait::async_trait;

use super::delegated::{ClassificationRequest, ClassificationResponse, ClassifierBackend};
use super::ClassifierError;

/// Anything that turns a prompt into text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: String) -> Result<String, ClassifierError>;
}

/// [`ClassifierBackend`] that talks to a [`TextGenerator`]
pub struct PromptBackend<G> {
    generator: G,
}

impl<G: TextGenerator> PromptBackend<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Build the categorization prompt for a request
    pub fn render_prompt(request: &ClassificationRequest) -> Result<String, ClassifierError> {
        let assessments = serde_json::to_string(&request.assessments)
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;
        let t = &request.thresholds;

        Ok(format!(
            "You are an expert environmental scientist categorizing pollution risk for a batch \
of groundwater quality assessments.

For each assessment, categorize the pollution risk as \"Safe\", \"Moderate\", or \"High Risk\".

Permissible limits ({standard}):
- HPI limit: {hpi}
- HEI limit: {hei}
- CF limit: {cf}
- PLI limit: {pli}

Risk levels:
- \"Safe\": all indices (HPI, HEI, CF, PLI) are below their limits.
- \"High Risk\": any index is above 150% of its limit, or more than one index is above its limit.
- \"Moderate\": some index is above its limit, but not to the extent of \"High Risk\".

CF is the highest contamination factor across the measured metals.

Assessments:
{assessments}

Reply with a JSON object of the form {{\"results\": [{{\"id\": <id>, \"riskLevel\": <level>}}]}} \
containing exactly one result per assessment id.",
            standard = request.standard,
            hpi = t.hpi,
            hei = t.hei,
            cf = t.cf,
            pli = t.pli,
        ))
    }

    /// Extract and parse the JSON object from a free-form reply
    pub fn parse_reply(reply: &str) -> Result<ClassificationResponse, ClassifierError> {
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            return Err(ClassifierError::MalformedResponse(
                "no output from generator".to_string(),
            ));
        }

        let start = trimmed.find('{');
        let end = trimmed.rfind('}');
        let body = match (start, end) {
            (Some(s), Some(e)) if s < e => &trimmed[s..=e],
            _ => {
                return Err(ClassifierError::MalformedResponse(
                    "reply contains no JSON object".to_string(),
                ))
            }
        };

        serde_json::from_str(body).map_err(|e| ClassifierError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl<G: TextGenerator> ClassifierBackend for PromptBackend<G> {
    async fn categorize(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError> {
        let prompt = Self::render_prompt(request)?;
        let reply = self.generator.generate(prompt).await?;
        Self::parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IndexSummary;
    use crate::standards::{StandardId, StandardsRegistry};
    use crate::types::RiskLevel;
    use std::sync::Mutex;

    struct CannedGenerator {
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: String) -> Result<String, ClassifierError> {
            *self.last_prompt.lock().unwrap() = Some(prompt);
            Ok(self.reply.clone())
        }
    }

    fn request() -> ClassificationRequest {
        let registry = StandardsRegistry::builtin();
        let bis = registry.resolve(StandardId::Bis).unwrap();
        ClassificationRequest::new(
            bis,
            &[IndexSummary {
                id: 5,
                hpi: 180.0,
                hei: 14.0,
                cf: 3.6,
                pli: 1.4,
            }],
        )
    }

    #[test]
    fn test_prompt_carries_thresholds_and_batch() {
        let prompt = PromptBackend::<CannedGenerator>::render_prompt(&request()).unwrap();
        assert!(prompt.contains("Permissible limits (BIS)"));
        assert!(prompt.contains("HPI limit: 100"));
        assert!(prompt.contains("\"id\":5"));
        assert!(prompt.contains("150%"));
    }

    #[test]
    fn test_parse_reply_with_surrounding_text() {
        let reply = "Here you go:\n```json\n{\"results\": [{\"id\": 5, \"riskLevel\": \"High Risk\"}]}\n```";
        let response = PromptBackend::<CannedGenerator>::parse_reply(reply).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].risk_level, RiskLevel::HighRisk);
    }

    #[test]
    fn test_parse_reply_rejects_empty_and_garbage() {
        assert!(matches!(
            PromptBackend::<CannedGenerator>::parse_reply("   "),
            Err(ClassifierError::MalformedResponse(_))
        ));
        assert!(matches!(
            PromptBackend::<CannedGenerator>::parse_reply("all safe"),
            Err(ClassifierError::MalformedResponse(_))
        ));
        assert!(matches!(
            PromptBackend::<CannedGenerator>::parse_reply("{\"results\": \"nope\"}"),
            Err(ClassifierError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_categorize_round_trip() {
        let generator = CannedGenerator {
            reply: r#"{"results": [{"id": 5, "riskLevel": "HighRisk"}]}"#.to_string(),
            last_prompt: Mutex::new(None),
        };
        let backend = PromptBackend::new(generator);

        let response = backend.categorize(&request()).await.unwrap();
        assert_eq!(response.results[0].id, 5);
        assert!(backend
            .generator
            .last_prompt
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|p| p.contains("Assessments:")));
    }
}
