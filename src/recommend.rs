use crate::models::{
    Category, CategoryRecommendation, QuestionRecommendation, RecallRecord, RecommendationLevel,
};

/// Mastery band boundaries; inclusive on the lower bound of each band.
pub const STRUGGLING_BELOW: f64 = 0.4;
pub const MASTERED_AT: f64 = 0.8;

const EXPLANATION_NEW: &str = "new category, needs exposure";
const EXPLANATION_STRUGGLING: &str = "struggling, focus recommended";
const EXPLANATION_PARTIAL: &str = "partial mastery, reinforcement suggested";
const EXPLANATION_MASTERED: &str = "mastered, deprioritized";

/// Top-k questions by urgency. The exponential form compresses the scores
/// of well-mastered items toward the tail while keeping poorly-recalled
/// items sharply separated at the top; a linear `1 - strength` score cannot
/// express that gradient. Ties keep input order (stable sort).
pub fn rank(records: &[RecallRecord], k: usize, beta: f64) -> Vec<QuestionRecommendation> {
    let mut ranked: Vec<QuestionRecommendation> = records
        .iter()
        .map(|record| QuestionRecommendation {
            question_id: record.question_id.clone(),
            score: (-beta * record.recall_strength).exp(),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(k);
    ranked
}

/// Subset selection for the session orchestrator: ranked question ids only.
pub fn select_subset(records: &[RecallRecord], k: usize, beta: f64) -> Vec<String> {
    rank(records, k, beta)
        .into_iter()
        .map(|entry| entry.question_id)
        .collect()
}

/// Band every category's mastery score into a recommendation level.
pub fn classify(categories: &[Category]) -> Vec<CategoryRecommendation> {
    categories
        .iter()
        .map(|category| {
            let (level, explanation) = classify_mastery(category.mastery_score);
            CategoryRecommendation {
                category_id: category.id.clone(),
                level,
                explanation: explanation.to_string(),
            }
        })
        .collect()
}

fn classify_mastery(mastery_score: f64) -> (RecommendationLevel, &'static str) {
    if mastery_score == 0.0 {
        (RecommendationLevel::High, EXPLANATION_NEW)
    } else if mastery_score < STRUGGLING_BELOW {
        (RecommendationLevel::High, EXPLANATION_STRUGGLING)
    } else if mastery_score < MASTERED_AT {
        (RecommendationLevel::Medium, EXPLANATION_PARTIAL)
    } else {
        (RecommendationLevel::Low, EXPLANATION_MASTERED)
    }
}
