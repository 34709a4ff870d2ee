//! Company-type classifier: deterministic keyword scoring over the posting.

use async_trait::async_trait;
use tracing::info;

use crate::pipeline::errors::PipelineError;
use crate::pipeline::models::{ClassificationResult, CompanyType, JobPosting};
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::text_bounds::tokens;

pub const RESEARCH_LEXICON: &[&str] = &[
    "research",
    "researcher",
    "scientist",
    "algorithm",
    "algorithmic",
    "optimization",
    "phd",
    "publication",
    "paper",
    "novel",
    "theory",
    "experiment",
    "benchmark",
    "machine learning",
    "deep learning",
    "computer vision",
    "model training",
];

pub const PRODUCT_LEXICON: &[&str] = &[
    "product",
    "customer",
    "deployment",
    "user",
    "user experience",
    "ship",
    "launch",
    "roadmap",
    "stakeholder",
    "delivery",
    "feature",
    "client",
    "business",
    "dashboard",
    "production",
    "go to market",
];

/// Scores a posting against both lexicons. Equal scores resolve to `product`.
pub fn classify(posting: &JobPosting) -> ClassificationResult {
    let text = tokens(&posting.scoring_text());
    let research_terms = matched_terms(&text, RESEARCH_LEXICON);
    let product_terms = matched_terms(&text, PRODUCT_LEXICON);

    let research_score = research_terms.len() as u32;
    let product_score = product_terms.len() as u32;

    let (label, tie_break) = if research_score > product_score {
        (CompanyType::TechnicalResearch, false)
    } else if product_score > research_score {
        (CompanyType::Product, false)
    } else {
        (CompanyType::Product, true)
    };

    ClassificationResult {
        label,
        research_score,
        product_score,
        research_terms,
        product_terms,
        tie_break,
    }
}

fn matched_terms(text: &[String], lexicon: &[&str]) -> Vec<String> {
    lexicon
        .iter()
        .filter(|term| contains_term(text, term))
        .map(|term| term.to_string())
        .collect()
}

/// True when the term's tokens appear contiguously in `text`. The last token
/// also matches with a trailing plural `s`.
fn contains_term(text: &[String], term: &str) -> bool {
    let needle: Vec<&str> = term.split_whitespace().collect();
    let Some((last, head)) = needle.split_last() else {
        return false;
    };
    if text.len() < needle.len() {
        return false;
    }

    text.windows(needle.len()).any(|window| {
        let head_matches = head.iter().zip(window).all(|(want, got)| got == want);
        let got_last = &window[needle.len() - 1];
        let last_matches =
            got_last == last || got_last.strip_suffix('s').is_some_and(|stem| stem == *last);
        head_matches && last_matches
    })
}

pub struct Classifier;

#[async_trait]
impl Stage for Classifier {
    type Input = JobPosting;
    type Output = ClassificationResult;

    const NAME: StageName = StageName::Classifier;

    async fn run(&self, posting: JobPosting) -> Result<ClassificationResult, PipelineError> {
        let result = classify(&posting);
        info!(
            stage = %Self::NAME,
            label = %result.label,
            research_score = result.research_score,
            product_score = result.product_score,
            tie_break = result.tie_break,
            "Posting classified"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(title: &str, description: &str) -> JobPosting {
        JobPosting::new("Acme", title, description)
    }

    #[test]
    fn test_research_posting_is_labelled_technical_research() {
        let result = classify(&posting(
            "Research Scientist, Optimization",
            "Design a novel algorithm; PhD preferred; strong research record.",
        ));
        assert_eq!(result.label, CompanyType::TechnicalResearch);
        assert!(!result.tie_break);
        assert!(result.research_terms.contains(&"phd".to_string()));
    }

    #[test]
    fn test_product_posting_is_labelled_product() {
        let result = classify(&posting(
            "Software Engineer, Product",
            "Own deployment pipelines and talk to every customer we onboard.",
        ));
        assert_eq!(result.label, CompanyType::Product);
        assert!(!result.tie_break);
        assert_eq!(result.product_score, 3);
    }

    #[test]
    fn test_no_matches_ties_to_product() {
        let result = classify(&posting("Gardener", "Water the plants and sweep the yard."));
        assert_eq!(result.research_score, 0);
        assert_eq!(result.product_score, 0);
        assert_eq!(result.label, CompanyType::Product);
        assert!(result.tie_break);
    }

    #[test]
    fn test_empty_input_is_a_tie() {
        let result = classify(&posting("", ""));
        assert!(result.tie_break);
        assert_eq!(result.label, CompanyType::Product);
    }

    #[test]
    fn test_plural_and_multi_word_terms_match() {
        let result = classify(&posting(
            "Engineer",
            "Experience with Machine-Learning benchmarks and user experiences.",
        ));
        assert!(result.research_terms.contains(&"machine learning".to_string()));
        assert!(result.research_terms.contains(&"benchmark".to_string()));
        assert!(result.product_terms.contains(&"user experience".to_string()));
    }

    #[test]
    fn test_terms_do_not_match_inside_longer_words() {
        // whole tokens only
        let result = classify(&posting("Engineer", "Boost productivity of the shipping team."));
        assert!(result.product_terms.is_empty());
    }

    #[test]
    fn test_each_term_counts_once() {
        let result = classify(&posting("Research", "research research research"));
        assert_eq!(result.research_score, 1);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let p = posting(
            "ML Researcher",
            "Publish papers, ship features to customers, run experiments.",
        );
        assert_eq!(classify(&p), classify(&p));
    }

    #[tokio::test]
    async fn test_stage_run_never_fails() {
        let result = Classifier.run(posting("", "")).await.unwrap();
        assert!(result.tie_break);
    }
}
