//! Static upstream source and output field configuration.
//!
//! The catalog is built and validated once at startup and passed into
//! the pipeline constructor; nothing here mutates after validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Catalog construction/validation errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog has no sources")]
    NoSources,
    #[error("catalog has no fields")]
    NoFields,
    #[error("duplicate source name: {0}")]
    DuplicateSource(String),
    #[error("duplicate field name: {0}")]
    DuplicateField(String),
    #[error("field {field} references unknown source: {source_name}")]
    UnknownSource { field: String, source_name: String },
    #[error("field {0} allows fallback but names no secondary source")]
    MissingSecondary(String),
}

/// One upstream source feeding the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSourceSpec {
    /// Source name, also the warehouse table it reads from.
    pub name: String,
    /// Prefix its fields carry in the output record.
    pub field_prefix: String,
    /// Critical sources gate the whole run via the upstream cascade.
    pub is_critical: bool,
    /// Snapshot staleness beyond this disqualifies the primary tier.
    pub max_staleness_days: i64,
    /// Fewer rows than this marks the source incomplete for the entity.
    pub expected_min_rows: u32,
    /// Column holding the per-row freshness date.
    pub date_field: String,
}

/// Computed fields, derived on the fly. These never fall back to a
/// static default; their formulas carry their own small-sample defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputedKind {
    RestAdvantage,
    InjuryRisk,
    ScoringTrend,
    MinutesChange,
    FtShare,
    WinPct,
}

/// How a field resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Primary source, then the named secondary, then the default.
    Fallback { secondary: String },
    /// No independent formula exists; absence of the primary goes
    /// straight to the default and usually signals an upstream gap.
    PrimaryOnly,
    /// Derived from other data at resolve time.
    Computed(ComputedKind),
}

/// One output field of the feature record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Primary source name. Empty for computed fields.
    pub source: String,
    pub kind: FieldKind,
    /// Static default for sourced fields. Ignored by computed fields.
    pub default: f64,
}

impl FieldSpec {
    fn fallback(name: &str, source: &str, secondary: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            kind: FieldKind::Fallback {
                secondary: secondary.to_string(),
            },
            default,
        }
    }

    fn primary_only(name: &str, source: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            kind: FieldKind::PrimaryOnly,
            default,
        }
    }

    fn computed(name: &str, kind: ComputedKind) -> Self {
        Self {
            name: name.to_string(),
            source: String::new(),
            kind: FieldKind::Computed(kind),
            default: 0.0,
        }
    }
}

/// Validated, immutable source and field configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCatalog {
    sources: Vec<UpstreamSourceSpec>,
    fields: Vec<FieldSpec>,
}

impl SourceCatalog {
    /// Build a catalog from explicit parts, validating cross-references.
    pub fn new(
        sources: Vec<UpstreamSourceSpec>,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, CatalogError> {
        if sources.is_empty() {
            return Err(CatalogError::NoSources);
        }
        if fields.is_empty() {
            return Err(CatalogError::NoFields);
        }

        let mut source_names = HashSet::new();
        for source in &sources {
            if !source_names.insert(source.name.as_str()) {
                return Err(CatalogError::DuplicateSource(source.name.clone()));
            }
        }

        let mut field_names = HashSet::new();
        for field in &fields {
            if !field_names.insert(field.name.as_str()) {
                return Err(CatalogError::DuplicateField(field.name.clone()));
            }
            match &field.kind {
                FieldKind::Computed(_) => {}
                FieldKind::PrimaryOnly => {
                    if !source_names.contains(field.source.as_str()) {
                        return Err(CatalogError::UnknownSource {
                            field: field.name.clone(),
                            source_name: field.source.clone(),
                        });
                    }
                }
                FieldKind::Fallback { secondary } => {
                    if !source_names.contains(field.source.as_str()) {
                        return Err(CatalogError::UnknownSource {
                            field: field.name.clone(),
                            source_name: field.source.clone(),
                        });
                    }
                    if secondary.is_empty() {
                        return Err(CatalogError::MissingSecondary(field.name.clone()));
                    }
                    if !source_names.contains(secondary.as_str()) {
                        return Err(CatalogError::UnknownSource {
                            field: field.name.clone(),
                            source_name: secondary.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self { sources, fields })
    }

    /// The standard player-feature catalog.
    pub fn standard() -> Self {
        let sources = vec![
            UpstreamSourceSpec {
                name: "player_game_logs".to_string(),
                field_prefix: "box".to_string(),
                is_critical: true,
                max_staleness_days: 3,
                expected_min_rows: 1,
                date_field: "game_date".to_string(),
            },
            UpstreamSourceSpec {
                name: "player_tracking".to_string(),
                field_prefix: "trk".to_string(),
                is_critical: false,
                max_staleness_days: 7,
                expected_min_rows: 1,
                date_field: "game_date".to_string(),
            },
            UpstreamSourceSpec {
                name: "injury_reports".to_string(),
                field_prefix: "inj".to_string(),
                is_critical: false,
                max_staleness_days: 2,
                expected_min_rows: 0,
                date_field: "report_date".to_string(),
            },
            UpstreamSourceSpec {
                name: "composite_ratings".to_string(),
                field_prefix: "cmp".to_string(),
                is_critical: true,
                max_staleness_days: 5,
                expected_min_rows: 1,
                date_field: "rating_date".to_string(),
            },
        ];

        let fields = vec![
            FieldSpec::fallback("avg_points", "player_game_logs", "player_tracking", 8.0),
            FieldSpec::fallback("avg_minutes", "player_game_logs", "player_tracking", 18.0),
            FieldSpec::fallback("avg_rebounds", "player_game_logs", "player_tracking", 3.5),
            FieldSpec::fallback("avg_assists", "player_game_logs", "player_tracking", 2.0),
            FieldSpec::fallback("usage_rate", "player_game_logs", "player_tracking", 0.18),
            FieldSpec::primary_only("offensive_rating", "composite_ratings", 100.0),
            FieldSpec::primary_only("defensive_rating", "composite_ratings", 100.0),
            FieldSpec::primary_only("load_index", "composite_ratings", 50.0),
            FieldSpec::computed("rest_advantage", ComputedKind::RestAdvantage),
            FieldSpec::computed("injury_risk", ComputedKind::InjuryRisk),
            FieldSpec::computed("scoring_trend", ComputedKind::ScoringTrend),
            FieldSpec::computed("minutes_change", ComputedKind::MinutesChange),
            FieldSpec::computed("ft_share", ComputedKind::FtShare),
            FieldSpec::computed("win_pct", ComputedKind::WinPct),
        ];

        Self::new(sources, fields).expect("standard catalog is valid")
    }

    pub fn sources(&self) -> &[UpstreamSourceSpec] {
        &self.sources
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn source(&self, name: &str) -> Option<&UpstreamSourceSpec> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Sources whose upstream pipelines gate the whole run.
    pub fn critical_sources(&self) -> impl Iterator<Item = &UpstreamSourceSpec> {
        self.sources.iter().filter(|s| s.is_critical)
    }
}
