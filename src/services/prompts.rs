//! Prompt text for the LLM-driven stages.

use crate::models::CodeType;

pub const NORMALIZE_MEDICATION_SYSTEM: &str = "\
Extract the drug name and relevant medication details from text to set it up for RxNorm lookup.
Preserve important medication information like dosage (e.g., 20mg), form (e.g., tablet -> tab, syrup), and strength.
Remove only extraneous information like frequency, patient instructions, or non-medication related text.

Examples:
\"Patient was prescribed Atorvastatin 20mg tablet\" -> \"atorvastatin 20mg tab\"
\"Taking metformin 500mg twice daily\" -> \"metformin 500mg\"
\"Give amoxicillin 250mg/5ml syrup\" -> \"amoxicillin 250mg/5ml syrup\"
\"Prescribed lisinopril 10 mg tablet\" -> \"lisinopril 10mg tablet\"

Return the cleaned medication text in lowercase, preserving important medication details.";

pub fn normalize_medication_user(free_text: &str) -> String {
    format!("Extract the medication details from: {}", free_text)
}

fn vocabulary(code_type: CodeType) -> &'static str {
    match code_type {
        CodeType::Medication => "RxNorm",
        CodeType::Condition => "ICD-10",
    }
}

/// System prompt for picking one candidate.
///
/// `examples` is the already formatted example block, or empty.
pub fn arbitration_system(code_type: CodeType, examples: &str, candidate_count: usize) -> String {
    let guidance = match code_type {
        CodeType::Medication => {
            "Given a drug name and a list of potential RxNorm matches, select the most appropriate match. \
             Consider both the drug name and the match score."
        }
        CodeType::Condition => {
            "Given a condition and a list of potential ICD-10 codes, select the most appropriate match. \
             Consider both the condition description and the ICD-10 code context."
        }
    };
    let examples = if examples.is_empty() {
        String::new()
    } else {
        format!("\n\nSimilar examples from our database:\n{}", examples)
    };
    format!(
        "You are a medical coding expert. {}{}\n\n\
         Return ONLY the number of the best match (1-{}). If none seem appropriate, return 0.",
        guidance, examples, candidate_count
    )
}

pub fn arbitration_user(
    code_type: CodeType,
    query: &str,
    candidates: &str,
    candidate_count: usize,
) -> String {
    let label = match code_type {
        CodeType::Medication => "Original drug query",
        CodeType::Condition => "Original condition",
    };
    format!(
        "{}: {}\n\nPotential matches:\n{}\n\nSelect the most appropriate match (1-{}) or 0 if none match:",
        label, query, candidates, candidate_count
    )
}

/// System prompt for the structured fallback when no terminology rows exist.
pub fn fallback_system(code_type: CodeType, examples: &str) -> String {
    format!(
        "You are a medical coding expert specializing in {} ({}) codes.\n\
         Based on similar examples, determine the most appropriate code for the given text.\n\n\
         Similar examples from our database:\n{}\n\n\
         No API result found.\n\n\
         Analyze the input text carefully and compare it to the examples.\n\
         Return a JSON object with the following fields:\n\
         - code: The most appropriate code, or \"N/A\" if none applies\n\
         - description: The description of the code\n\
         - confidence: Your confidence in this match (0.0-1.0)\n\
         - reasoning: Brief explanation of your decision",
        code_type,
        vocabulary(code_type),
        examples
    )
}

pub fn fallback_user(code_type: CodeType, text: &str) -> String {
    format!("Find the most appropriate {} code for: {}", code_type, text)
}
