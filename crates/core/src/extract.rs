//! Text extraction and validation operators (C5): fact/entity extraction
//! from free text, citation/source validation, and fact-conflict
//! detection. These are pure functions over strings — persistence of the
//! resulting records is the caller's responsibility.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::error::ProcessingError;
use crate::types::ids::{CitationId, ConflictId, EntityId, FactId, RelationshipId};
use crate::types::model::{
    Citation, ConflictSeverity, ConflictType, Entity, Fact, FactConflict, Relationship,
    SourceQuality, ValueType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    Fact,
    Entity,
    All,
}

impl ExtractMode {
    pub fn parse(s: &str) -> Result<Self, ProcessingError> {
        Ok(match s {
            "fact" => ExtractMode::Fact,
            "entity" => ExtractMode::Entity,
            "all" => ExtractMode::All,
            other => {
                return Err(ProcessingError::Extraction(format!(
                    "unknown extract mode '{other}'"
                )))
            }
        })
    }
}

pub struct ExtractResult {
    pub facts: Vec<Fact>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    /// Mean confidence across every extracted record, 0.0 when nothing
    /// was extracted.
    pub extraction_quality: f64,
}

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z][\w&.,'\- ]{1,60}?)\s+(?:is|was|reached|hit|totaled|totalled)\s+\$?([\d,]+(?:\.\d+)?)\s*(billion|million|trillion|bn|mn|tn)?\b").unwrap()
});

static PERCENTAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z][\w&.,'\- ]{1,60}?)\s+(?:grew|growth rate|margin|share|rate) (?:of|is|was)?\s*([\d.]+)\s*%").unwrap()
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z][\w&.,'\- ]{1,60}?)\s+(?:was founded|was established|launched|began)\s+(?:in|on)?\s*((?:\d{4})|(?:[A-Z][a-z]+ \d{1,2},? \d{4}))\b").unwrap()
});

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,3})\b").unwrap());

const STOPWORDS: &[&str] = &["The", "This", "That", "These", "Those", "It", "They"];

const COMPANY_SUFFIXES: &[&str] = &[
    "Inc", "Inc.", "Corp", "Corp.", "Corporation", "LLC", "Ltd", "Ltd.", "Co.", "Company",
    "Group", "Holdings", "Technologies", "Labs", "Partners",
];

const TECH_KEYWORDS: &[&str] = &[
    "AI", "API", "GPU", "CPU", "SaaS", "Cloud", "Kubernetes", "Blockchain", "LLM", "SDK",
];

/// Classify a candidate entity name into one of the open-vocabulary entity
/// types the extraction operator recognizes. Heuristic, regex/suffix driven
/// (no NER model): company suffixes and known tech keywords are checked
/// first since they're unambiguous; a bare two-word capitalized phrase with
/// neither is assumed to be a person's name; anything else is `unknown`.
fn classify_entity(name: &str) -> &'static str {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words
        .iter()
        .any(|w| COMPANY_SUFFIXES.iter().any(|suffix| w.trim_end_matches('.') == suffix.trim_end_matches('.')))
    {
        return "company";
    }
    if words.iter().any(|w| TECH_KEYWORDS.contains(w)) {
        return "technology";
    }
    if words.len() == 2 && words.iter().all(|w| w.chars().next().is_some_and(|c| c.is_uppercase())) {
        return "person";
    }
    "unknown"
}

/// Verbs the relationship extractor recognizes, mapped to a stable
/// `relationship_type` label. Order matters: the regex alternation tries
/// them in this order, and "acquires" must come after the two-word verbs
/// so it doesn't shadow a longer match.
const RELATIONSHIP_VERBS: &[(&str, &str)] = &[
    ("invests in", "invests_in"),
    ("competes with", "competes_with"),
    ("acquires", "acquires"),
];

static RELATIONSHIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z][\w&.,'\- ]{1,60}?)\s+(invests in|competes with|acquires)\s+([A-Z][\w&.,'\- ]{1,60}?)[.\n;]").unwrap()
});

/// Extract facts and/or entities from `text`. Regex-driven: every match
/// yields a record with a heuristic confidence based on how specific the
/// pattern is (currency/percentage/date patterns score higher than the
/// generic capitalized-phrase entity matcher). `extract_relations` additionally
/// scans for directed relationships between entities ("invests in",
/// "competes with", "acquires") when entities are being extracted.
pub fn extract(
    text: &str,
    mode: ExtractMode,
    extract_relations: bool,
) -> Result<ExtractResult, ProcessingError> {
    let mut facts = Vec::new();
    let mut entities = Vec::new();
    let mut relationships = Vec::new();

    if matches!(mode, ExtractMode::Fact | ExtractMode::All) {
        for cap in CURRENCY_RE.captures_iter(text) {
            let entity = cap[1].trim().to_string();
            let raw_value: f64 = cap[2].replace(',', "").parse().unwrap_or(0.0);
            let unit = cap.get(3).map(|m| m.as_str().to_string());
            facts.push(Fact {
                fact_id: FactId::new(),
                session_id: None,
                entity,
                attribute: "value".into(),
                value: cap[0].trim().to_string(),
                value_type: ValueType::Currency,
                value_numeric: Some(raw_value),
                unit,
                source_url: None,
                source_quality: None,
                confidence: 0.85,
            });
        }
        for cap in PERCENTAGE_RE.captures_iter(text) {
            let entity = cap[1].trim().to_string();
            let raw_value: f64 = cap[2].parse().unwrap_or(0.0);
            facts.push(Fact {
                fact_id: FactId::new(),
                session_id: None,
                entity,
                attribute: "rate".into(),
                value: cap[0].trim().to_string(),
                value_type: ValueType::Percentage,
                value_numeric: Some(raw_value),
                unit: Some("%".into()),
                source_url: None,
                source_quality: None,
                confidence: 0.8,
            });
        }
        for cap in DATE_RE.captures_iter(text) {
            let entity = cap[1].trim().to_string();
            facts.push(Fact {
                fact_id: FactId::new(),
                session_id: None,
                entity,
                attribute: "founding_date".into(),
                value: cap[2].trim().to_string(),
                value_type: ValueType::Date,
                value_numeric: None,
                unit: None,
                source_url: None,
                source_quality: None,
                confidence: 0.75,
            });
        }
    }

    if matches!(mode, ExtractMode::Entity | ExtractMode::All) {
        let mut seen = std::collections::HashSet::new();
        for cap in ENTITY_RE.captures_iter(text) {
            let name = cap[1].trim().to_string();
            if STOPWORDS.contains(&name.as_str()) || name.len() < 3 || !seen.insert(name.clone()) {
                continue;
            }
            let entity_type = classify_entity(&name).to_string();
            entities.push(Entity {
                entity_id: EntityId::new(),
                session_id: None,
                name,
                entity_type,
            });
        }

        if extract_relations {
            for cap in RELATIONSHIP_RE.captures_iter(text) {
                let verb = cap[2].to_lowercase();
                let Some((_, relationship_type)) =
                    RELATIONSHIP_VERBS.iter().find(|(v, _)| *v == verb)
                else {
                    continue;
                };
                relationships.push(Relationship {
                    relationship_id: RelationshipId::new(),
                    session_id: None,
                    source_entity: cap[1].trim().to_string(),
                    target_entity: cap[3].trim().to_string(),
                    relationship_type: relationship_type.to_string(),
                    confidence: 0.7,
                    evidence: cap[0].trim().trim_end_matches(|c: char| ".;".contains(c)).to_string(),
                });
            }
        }
    }

    let total = facts.len() + entities.len() + relationships.len();
    let extraction_quality = if total == 0 {
        0.0
    } else {
        let sum: f64 = facts.iter().map(|f| f.confidence).sum::<f64>()
            + entities.iter().map(|_| 0.6_f64).sum::<f64>()
            + relationships.iter().map(|r| r.confidence).sum::<f64>();
        sum / total as f64
    };

    Ok(ExtractResult {
        facts,
        entities,
        relationships,
        extraction_quality,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    Citation,
    Source,
    All,
}

impl ValidateMode {
    pub fn parse(s: &str) -> Result<Self, ProcessingError> {
        Ok(match s {
            "citation" => ValidateMode::Citation,
            "source" => ValidateMode::Source,
            "all" => ValidateMode::All,
            other => {
                return Err(ProcessingError::Extraction(format!(
                    "unknown validate mode '{other}'"
                )))
            }
        })
    }
}

/// Rate a source by domain/publisher string. Unknown source types default
/// to `'C'`, a conservative news-tier rating rather than the most generous
/// bucket.
pub fn rate_source(source: &str) -> SourceQuality {
    let s = source.to_lowercase();
    if s.contains(".gov") || s.contains("peer-reviewed") || s.contains("doi.org") {
        SourceQuality::A
    } else if s.contains(".edu") || s.contains("reuters") || s.contains("bloomberg") || s.contains("sec.gov") {
        SourceQuality::B
    } else if s.contains("wikipedia") || s.contains("blog") {
        SourceQuality::D
    } else if s.is_empty() {
        SourceQuality::E
    } else {
        SourceQuality::C
    }
}

/// Validate citation completeness and/or source quality for a batch of
/// citations, returning them with `is_valid`/`quality_rating`/
/// `validation_notes` populated.
pub fn validate(mut citations: Vec<Citation>, mode: ValidateMode) -> Vec<Citation> {
    for citation in &mut citations {
        let mut notes = Vec::new();
        if matches!(mode, ValidateMode::Citation | ValidateMode::All) {
            if citation.is_complete() {
                citation.is_valid = true;
            } else {
                citation.is_valid = false;
                notes.push("missing one or more of author/title/date/url".to_string());
            }
        }
        if matches!(mode, ValidateMode::Source | ValidateMode::All) {
            let source = citation
                .source
                .clone()
                .or_else(|| citation.url.clone())
                .unwrap_or_default();
            citation.quality_rating = Some(rate_source(&source));
        }
        if !notes.is_empty() {
            citation.validation_notes = Some(notes.join("; "));
        }
    }
    citations
}

pub fn new_citation_id() -> CitationId {
    CitationId::new()
}

/// Relative difference above which two numeric facts about the same
/// entity/attribute are flagged as conflicting, and the thresholds that
/// classify the conflict's severity.
const NUMERIC_MINOR_THRESHOLD: f64 = 0.05;
const NUMERIC_CRITICAL_THRESHOLD: f64 = 0.20;

/// Pairwise-compare `facts` for the same `entity`/`attribute` and flag
/// numeric or temporal disagreement. Symmetric: comparing `(a, b)` and
/// `(b, a)` produces the same conflict, so each pair is only emitted once.
pub fn conflict_detect(facts: &[Fact]) -> Vec<FactConflict> {
    let mut conflicts = Vec::new();
    for i in 0..facts.len() {
        for j in (i + 1)..facts.len() {
            let a = &facts[i];
            let b = &facts[j];
            if a.entity != b.entity || a.attribute != b.attribute {
                continue;
            }
            if let (Some(va), Some(vb)) = (a.value_numeric, b.value_numeric) {
                if a.value_type == ValueType::Date {
                    continue;
                }
                let denom = va.abs().max(vb.abs()).max(f64::EPSILON);
                let relative_diff = (va - vb).abs() / denom;
                if relative_diff > NUMERIC_MINOR_THRESHOLD {
                    let severity = if relative_diff > NUMERIC_CRITICAL_THRESHOLD {
                        ConflictSeverity::Critical
                    } else {
                        ConflictSeverity::Moderate
                    };
                    conflicts.push(FactConflict {
                        conflict_id: ConflictId::new(),
                        session_id: a.session_id,
                        fact_a: a.fact_id,
                        fact_b: b.fact_id,
                        conflict_type: ConflictType::Numerical,
                        severity,
                        resolved: false,
                    });
                }
            } else if a.value_type == ValueType::Date && b.value_type == ValueType::Date && a.value != b.value {
                conflicts.push(FactConflict {
                    conflict_id: ConflictId::new(),
                    session_id: a.session_id,
                    fact_a: a.fact_id,
                    fact_b: b.fact_id,
                    conflict_type: ConflictType::Temporal,
                    severity: ConflictSeverity::Moderate,
                    resolved: false,
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_currency_fact() {
        let result = extract(
            "Acme Corp revenue was $4.2 billion in the last fiscal year.",
            ExtractMode::Fact,
            false,
        )
        .unwrap();
        assert!(!result.facts.is_empty());
        assert_eq!(result.facts[0].value_type, ValueType::Currency);
    }

    #[test]
    fn extracts_percentage_fact() {
        let result = extract(
            "Cloud revenue grew 34.5% year over year.",
            ExtractMode::Fact,
            false,
        )
        .unwrap();
        assert!(result.facts.iter().any(|f| f.value_type == ValueType::Percentage));
    }

    #[test]
    fn classifies_company_and_person_entities() {
        let result = extract(
            "Acme Corp hired Jane Smith as its new head of research.",
            ExtractMode::Entity,
            false,
        )
        .unwrap();
        assert!(result.entities.iter().any(|e| e.entity_type == "company"));
        assert!(result.entities.iter().any(|e| e.entity_type == "person"));
    }

    #[test]
    fn extracts_relationship_edge() {
        let result = extract(
            "Acme Corp acquires Beta Robotics.",
            ExtractMode::Entity,
            true,
        )
        .unwrap();
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].relationship_type, "acquires");
        assert_eq!(result.relationships[0].confidence, 0.7);
    }

    #[test]
    fn unknown_source_defaults_to_c() {
        assert_eq!(rate_source("randomblogsite.io"), SourceQuality::C);
        assert_eq!(rate_source(""), SourceQuality::E);
        assert_eq!(rate_source("https://www.sec.gov/filing"), SourceQuality::B);
    }

    #[test]
    fn incomplete_citation_is_invalid() {
        let citation = Citation {
            citation_id: CitationId::new(),
            session_id: None,
            author: None,
            title: Some("A Study".into()),
            source: Some("nature.com".into()),
            url: Some("https://nature.com/study".into()),
            publication_date: Some("2024".into()),
            quality_rating: None,
            is_valid: false,
            validation_notes: None,
        };
        let validated = validate(vec![citation], ValidateMode::All);
        assert!(!validated[0].is_valid);
        assert!(validated[0].validation_notes.is_some());
    }

    #[test]
    fn numeric_conflict_detected_and_severity_scales() {
        let fact_a = Fact {
            fact_id: FactId::new(),
            session_id: None,
            entity: "Acme".into(),
            attribute: "revenue".into(),
            value: "$4.2 billion".into(),
            value_type: ValueType::Currency,
            value_numeric: Some(4.2),
            unit: Some("billion".into()),
            source_url: None,
            source_quality: None,
            confidence: 0.8,
        };
        let mut fact_b = fact_a.clone();
        fact_b.fact_id = FactId::new();
        fact_b.value_numeric = Some(6.0);

        let conflicts = conflict_detect(&[fact_a, fact_b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Numerical);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Critical);
    }

    #[test]
    fn small_numeric_difference_is_not_a_conflict() {
        let fact_a = Fact {
            fact_id: FactId::new(),
            session_id: None,
            entity: "Acme".into(),
            attribute: "revenue".into(),
            value: "$4.20 billion".into(),
            value_type: ValueType::Currency,
            value_numeric: Some(4.20),
            unit: Some("billion".into()),
            source_url: None,
            source_quality: None,
            confidence: 0.8,
        };
        let mut fact_b = fact_a.clone();
        fact_b.fact_id = FactId::new();
        fact_b.value_numeric = Some(4.21);

        assert!(conflict_detect(&[fact_a, fact_b]).is_empty());
    }
}
