//! Extracted skill accumulators.
//!
//! Each named skill tracks six attributes that the interview tries to fill:
//! duration, depth, autonomy, scale, constraints, and whether the work was
//! production or prototype. Attributes accumulate over turns: values merge
//! in attribute-by-attribute and a populated attribute is never erased by a
//! later empty observation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Values the extractor may emit that carry no information.
const PLACEHOLDER_VALUES: [&str; 6] = ["unknown", "not specified", "none", "n/a", "", "null"];

/// The six attributes tracked per skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkillAttribute {
    Duration,
    Depth,
    Autonomy,
    Scale,
    Constraints,
    ProductionVsPrototype,
}

impl SkillAttribute {
    /// All attributes, in canonical order.
    pub const ALL: [SkillAttribute; 6] = [
        SkillAttribute::Duration,
        SkillAttribute::Depth,
        SkillAttribute::Autonomy,
        SkillAttribute::Scale,
        SkillAttribute::Constraints,
        SkillAttribute::ProductionVsPrototype,
    ];
}

impl fmt::Display for SkillAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillAttribute::Duration => write!(f, "duration"),
            SkillAttribute::Depth => write!(f, "depth"),
            SkillAttribute::Autonomy => write!(f, "autonomy"),
            SkillAttribute::Scale => write!(f, "scale"),
            SkillAttribute::Constraints => write!(f, "constraints"),
            SkillAttribute::ProductionVsPrototype => write!(f, "production_vs_prototype"),
        }
    }
}

impl FromStr for SkillAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duration" => Ok(SkillAttribute::Duration),
            "depth" => Ok(SkillAttribute::Depth),
            "autonomy" => Ok(SkillAttribute::Autonomy),
            "scale" => Ok(SkillAttribute::Scale),
            "constraints" => Ok(SkillAttribute::Constraints),
            "production_vs_prototype" => Ok(SkillAttribute::ProductionVsPrototype),
            other => Err(format!("invalid skill attribute: '{other}'")),
        }
    }
}

/// Whether a string carries actual information or is an extractor placeholder.
pub fn is_meaningful(value: &str) -> bool {
    let trimmed = value.trim();
    !PLACEHOLDER_VALUES
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// A single attribute observation produced by the extractor for one answer.
///
/// `correction` marks an explicit correction signal ("actually it was two
/// years, not three") which is the only way an already-populated attribute
/// may be cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillObservation {
    pub skill: String,
    pub attribute: SkillAttribute,
    pub value: String,
    #[serde(default)]
    pub correction: bool,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Accumulator for one named skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSkill {
    pub name: String,
    pub confidence_score: f64,
    pub duration: Option<String>,
    pub depth: Option<String>,
    pub autonomy: Option<String>,
    pub scale: Option<String>,
    pub constraints: Option<String>,
    pub production_vs_prototype: Option<String>,
    pub evidence: String,
}

impl ExtractedSkill {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence_score: 1.0,
            duration: None,
            depth: None,
            autonomy: None,
            scale: None,
            constraints: None,
            production_vs_prototype: None,
            evidence: String::new(),
        }
    }

    pub fn attribute(&self, attr: SkillAttribute) -> Option<&str> {
        let slot = match attr {
            SkillAttribute::Duration => &self.duration,
            SkillAttribute::Depth => &self.depth,
            SkillAttribute::Autonomy => &self.autonomy,
            SkillAttribute::Scale => &self.scale,
            SkillAttribute::Constraints => &self.constraints,
            SkillAttribute::ProductionVsPrototype => &self.production_vs_prototype,
        };
        slot.as_deref()
    }

    fn slot_mut(&mut self, attr: SkillAttribute) -> &mut Option<String> {
        match attr {
            SkillAttribute::Duration => &mut self.duration,
            SkillAttribute::Depth => &mut self.depth,
            SkillAttribute::Autonomy => &mut self.autonomy,
            SkillAttribute::Scale => &mut self.scale,
            SkillAttribute::Constraints => &mut self.constraints,
            SkillAttribute::ProductionVsPrototype => &mut self.production_vs_prototype,
        }
    }

    /// Attributes that still have no meaningful value.
    pub fn missing_attributes(&self) -> Vec<SkillAttribute> {
        SkillAttribute::ALL
            .into_iter()
            .filter(|attr| {
                self.attribute(*attr)
                    .map(|v| !is_meaningful(v))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Number of attributes with a meaningful value.
    pub fn known_attribute_count(&self) -> usize {
        SkillAttribute::ALL.len() - self.missing_attributes().len()
    }
}

/// Effect of merging one observation into the skill set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEffect {
    /// A previously unset attribute was filled.
    NewAttribute,
    /// An already-populated attribute was updated with a new value.
    Refined,
    /// A populated attribute was cleared by an explicit correction.
    Erased,
    /// The observation carried no usable information.
    Unchanged,
}

/// All skills extracted so far, keyed by lower-cased name.
///
/// Names are case-insensitive and unique; the first-seen spelling of the
/// name is preserved for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillSet(BTreeMap<String, ExtractedSkill>);

impl SkillSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedSkill> {
        self.0.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedSkill> {
        self.0.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.values().map(|s| s.name.clone()).collect()
    }

    /// Insert a skill seeded from resume analysis (keeps existing entries).
    pub fn seed(&mut self, skill: ExtractedSkill) {
        self.0.entry(skill.name.to_lowercase()).or_insert(skill);
    }

    /// Merge one attribute observation.
    ///
    /// - A meaningful value fills an empty attribute (`NewAttribute`) or
    ///   updates a populated one (`Refined`).
    /// - A placeholder value with `correction` set clears the attribute
    ///   (`Erased`); without the correction flag it is ignored, so a no-op
    ///   answer never discards previously captured data.
    pub fn merge(&mut self, obs: &SkillObservation) -> MergeEffect {
        let key = obs.skill.to_lowercase();
        let meaningful = is_meaningful(&obs.value);
        if !meaningful && !self.0.contains_key(&key) {
            // A placeholder for a skill we have never seen carries nothing.
            return MergeEffect::Unchanged;
        }
        let skill = self
            .0
            .entry(key)
            .or_insert_with(|| ExtractedSkill::new(obs.skill.clone()));
        let slot = skill.slot_mut(obs.attribute);
        let had_value = slot.as_deref().map(is_meaningful).unwrap_or(false);

        let effect = if meaningful {
            *slot = Some(obs.value.trim().to_string());
            if had_value {
                MergeEffect::Refined
            } else {
                MergeEffect::NewAttribute
            }
        } else if obs.correction && had_value {
            *slot = None;
            MergeEffect::Erased
        } else {
            MergeEffect::Unchanged
        };

        if effect != MergeEffect::Unchanged {
            if let Some(evidence) = &obs.evidence {
                if !evidence.is_empty() {
                    if !skill.evidence.is_empty() {
                        skill.evidence.push('\n');
                    }
                    skill.evidence.push_str(evidence);
                }
            }
            skill.confidence_score = skill.confidence_score.max(obs.confidence);
        }

        effect
    }

    /// Attribute coverage across all skills: known attributes over total.
    pub fn attribute_coverage(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let total = self.0.len() * SkillAttribute::ALL.len();
        let known: usize = self.0.values().map(|s| s.known_attribute_count()).sum();
        known as f64 / total as f64
    }
}
