//! Prompts for the three model-backed stages.
//!
//! Each stage has a fixed system prompt and a user prompt builder. JSON-mode
//! prompts end with the target JSON schema so the same text works when the
//! stage falls back to plain text mode.

use sentinel_core::{ConsensusEvaluation, Posting, SchemaKind, StructuredSummary};

/// Most recent historical corrections included in a classification prompt.
pub const MAX_PROMPT_CORRECTIONS: usize = 20;

/// System prompt for the extraction stage.
pub const EXTRACTION_SYSTEM: &str =
    "You are a job posting data extractor. Return valid JSON only. No explanation.";

/// System prompt for every ensemble member.
pub const CLASSIFICATION_SYSTEM: &str = "You are an expert Recruitment Consultant and Talent \
Acquisition Specialist across all industries. You specialize in mapping job titles to \
standardized job families, understanding that different companies use different nomenclature \
for the same professional role.";

/// System prompt for the audit reviewer.
pub const AUDIT_SYSTEM: &str = "You are a QA specialist for job evaluation accuracy. Your role \
is to verify that an evaluation is logically consistent with the structured job summary data. \
Flag contradictions and errors.";

fn schema_footer(kind: SchemaKind) -> String {
    format!(
        "### OUTPUT FORMAT\nRespond ONLY with a JSON object matching this JSON Schema:\n{}",
        kind.source().trim()
    )
}

fn format_years(years: Option<u32>) -> String {
    years.map_or_else(|| "Not specified".to_string(), |y| y.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn summary_block(summary: &StructuredSummary) -> String {
    format!(
        "Title (normalized): {}\n\
         Role Type: {}\n\
         Seniority Level: {}\n\
         Years Experience Required: {}\n\
         Education Required: {}\n\
         Is Internship/Co-op: {}\n\
         Visa Statements: {}\n\
         Key Requirements: {}\n\
         Description Summary: {}",
        summary.title_normalized,
        to_json(&summary.role_type).trim_matches('"'),
        to_json(&summary.seniority_level).trim_matches('"'),
        format_years(summary.years_experience_required),
        to_json(&summary.education_required).trim_matches('"'),
        summary.is_internship_coop,
        to_json(&summary.visa_statements),
        to_json(&summary.key_requirements),
        summary.description_summary,
    )
}

/// User prompt for extraction.
pub fn extraction_prompt(posting: &Posting, target_roles: &[String]) -> String {
    format!(
        r#"### RAW JOB POSTING
Job Title: {title}
Company: {company}
Location: {location}
Target Roles: [{roles}]

Description:
{description}

### EXAMPLE OUTPUT
{{
  "title_normalized": "Software Engineer",
  "role_type": "software_engineering",
  "seniority_level": "senior",
  "years_experience_required": 5,
  "education_required": "bachelors",
  "visa_statements": ["must be authorized to work in the US"],
  "is_internship_coop": false,
  "key_requirements": ["Python", "AWS", "3+ years backend"],
  "description_summary": "Backend role focused on cloud services."
}}

### FIELD RULES
1. title_normalized - Remove seniority words (Senior, Lead, Junior, Staff, Principal, I, II, III, IV). "Senior Data Analyst II" becomes "Data Analyst".
2. role_type - One of: software_engineering, data_science, data_engineering, data_analysis, product_management, project_management, design, devops, security, qa, other.
3. seniority_level - One of: intern, entry, junior, mid, senior, lead, staff, principal, director, vp, unknown. Use title keywords and years required.
4. years_experience_required - Minimum years from requirements section. null if not stated.
5. education_required - One of: none, high_school, bachelors, masters, phd, unknown. Mandatory minimum only.
6. visa_statements - Copy sentences about work authorization or visa sponsorship verbatim. Empty list if none mentioned.
7. is_internship_coop - true if internship, co-op, fellowship, or apprenticeship.
8. key_requirements - Main mandatory requirements (up to 8). Fewer is fine.
9. description_summary - 1-3 sentence role summary.

{footer}"#,
        title = posting.title,
        company = posting.company,
        location = posting.location.as_deref().unwrap_or("Unknown"),
        roles = target_roles.join(", "),
        description = posting.description.as_deref().unwrap_or_default(),
        footer = schema_footer(SchemaKind::Summary),
    )
}

/// User prompt for one ensemble member.
///
/// `corrections` is the historical snapshot, most recent last; only the last
/// [`MAX_PROMPT_CORRECTIONS`] are used. `review_feedback` is the pending
/// audit correction, if any.
pub fn classification_prompt(
    summary: &StructuredSummary,
    target_roles: &[String],
    corrections: &[String],
    review_feedback: Option<&str>,
) -> String {
    let mut feedback_section = String::new();
    if let Some(feedback) = review_feedback.filter(|f| !f.trim().is_empty()) {
        feedback_section.push_str(&format!(
            "\n### REVIEWER CORRECTION (address this in your analysis)\n{}\n",
            feedback
        ));
    }
    if !corrections.is_empty() {
        let start = corrections.len().saturating_sub(MAX_PROMPT_CORRECTIONS);
        let lines: Vec<String> = corrections[start..]
            .iter()
            .map(|c| format!("- {}", c))
            .collect();
        feedback_section.push_str(&format!(
            "\n### PAST CORRECTIONS (avoid these mistakes)\n{}\n",
            lines.join("\n")
        ));
    }

    format!(
        r#"### STRUCTURED JOB DATA
{summary}

Target Roles: [{roles}]
{feedback_section}
### INSTRUCTIONS
Using the structured data above, evaluate the job on these criteria:

1. **keyword_match**: (true/false)
   - Compare the normalized job title against the Target Roles list.
   - Return TRUE if the title represents the same professional function as any target role, regardless of seniority.
   - Seniority modifiers to ignore: Senior, Lead, Staff, Principal, Junior, Entry-level, I, II, III, IV, etc.
   - Examples:
     * Title: "Software Engineer", Target: ["software engineer"] -> TRUE
     * Title: "Product Manager", Target: ["software engineer", "product manager"] -> TRUE
     * Title: "Data Scientist", Target: ["software engineer"] -> FALSE

2. **visa_sponsorship**: (true/false)
   - Check the visa statements.
   - DEFAULT to TRUE if there are no visa statements (silence = TRUE).
   - Return FALSE ONLY if there is an explicit negative statement like:
     * "Must be a US Citizen or Permanent Resident"
     * "No visa sponsorship available"
     * "Candidates must be authorized to work without sponsorship"

3. **is_internship**: (true/false)
   - Use the Is Internship/Co-op field directly.
   - Also return TRUE if the title contains "Intern", "Internship", "Co-op", "Fellowship", or "Apprenticeship".

4. **job_level**: one of internship, entry, junior, mid, senior
   - internship: internships, co-ops, fellowships, apprenticeships.
   - entry: no experience required, or 0 years with an entry/intern seniority.
   - junior: 1-2 years required.
   - mid: 3-4 years required, or seniority "mid".
   - senior: 5+ years required, or seniority senior/lead/staff/principal/director/vp.

5. **requires_phd**: (true/false)
   - Return TRUE only if a PhD is mandatory (not preferred).

6. **reason**: concise breakdown citing the structured data for each field.

{footer}"#,
        summary = summary_block(summary),
        roles = target_roles.join(", "),
        feedback_section = feedback_section,
        footer = schema_footer(SchemaKind::Vote),
    )
}

/// User prompt for the audit reviewer.
pub fn audit_prompt(
    summary: &StructuredSummary,
    evaluation: &ConsensusEvaluation,
    target_roles: &[String],
) -> String {
    format!(
        r#"### TASK
You are reviewing an evaluation of a job posting for logical consistency.
Compare the evaluation against the structured job summary data and flag any contradictions.

### STRUCTURED JOB SUMMARY
{summary}

### EVALUATION UNDER REVIEW
keyword_match: {keyword_match}
visa_sponsorship: {visa_sponsorship}
job_level: {job_level}
requires_phd: {requires_phd}
is_internship: {is_internship}
reason: {reason}

Target Roles: [{roles}]

### REVIEW CRITERIA
Check each field for logical consistency:

1. **keyword_match**: Does the normalized title match any target role, ignoring seniority? Does the role type align with the target roles?
2. **visa_sponsorship**: With no visa statements this MUST be true. Explicit bars ("must be US citizen", "no sponsorship") mean false.
3. **job_level**: Check for contradictions:
   - years_experience_required >= 1 but job_level entry -> CONTRADICTION
   - seniority senior/lead/staff but job_level below senior -> CONTRADICTION
   - years null/0, seniority entry/intern/unknown, but job_level mid or senior -> POSSIBLE ERROR
4. **requires_phd**: education_required is not phd but requires_phd=true -> CONTRADICTION
5. **is_internship**: Is Internship/Co-op differs from is_internship -> CONTRADICTION

If not approved, feedback must state what is wrong and the correct value based on the data.
If approved, feedback may be empty. List each contradiction in "gaps".

{footer}"#,
        summary = summary_block(summary),
        keyword_match = evaluation.keyword_match,
        visa_sponsorship = evaluation.visa_sponsorship,
        job_level = evaluation.job_level,
        requires_phd = evaluation.requires_phd,
        is_internship = evaluation.is_internship,
        reason = evaluation.reason,
        roles = target_roles.join(", "),
        footer = schema_footer(SchemaKind::Verdict),
    )
}
