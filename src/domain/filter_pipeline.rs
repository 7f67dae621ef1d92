// Faceted filter pipeline - category filter, bounds, range rebasing and range filter
use super::entity::Entity;
use super::filter::{
    Badge, Bounds, DEFAULT_LATENCY_BOUNDS, DEFAULT_REQUEST_COUNT_BOUNDS, FacetId, FacetMutation,
    FilterError, FilterSettings, FilterState, SessionPhase, ThresholdBucket, Thresholds,
};
use super::metrics::{EntityKey, MetricKind};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBounds {
    pub latency: Bounds,
    pub request_count: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRanges {
    pub latency: bool,
    pub request_count: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub entities: Vec<Entity>,
    pub bounds: FacetBounds,
    pub active_ranges: ActiveRanges,
    pub badges: Vec<Badge>,
    pub selected_entity: Option<EntityKey>,
    pub state: FilterState,
}

/// Apply an optional mutation, then re-run the pipeline.
pub fn reduce(
    entities: &[Entity],
    mut state: FilterState,
    mutation: Option<FacetMutation>,
    settings: &FilterSettings,
) -> Result<FilterOutcome, FilterError> {
    if let Some(mutation) = mutation {
        state.apply(mutation)?;
    }
    Ok(run(entities, state, settings))
}

/// Run every stage over `entities` and return the results with the state
/// to feed into the next run. Pure: equal inputs give equal outputs.
pub fn run(entities: &[Entity], mut state: FilterState, settings: &FilterSettings) -> FilterOutcome {
    let has_data = state.phase != SessionPhase::Initial || !entities.is_empty();
    if state.phase == SessionPhase::Initial && has_data {
        tracing::debug!("Filter session received its first data");
        state.phase = SessionPhase::Loaded;
    }

    let subset = category_filter(entities, &state, settings);
    let latency_kind = state.percentile.metric_kind();
    let bounds = compute_bounds(&subset, latency_kind);

    let percentile_changed = state.bounds_percentile != Some(state.percentile);
    let latency = rebase(
        state.latency.selected,
        state.latency.bounds,
        bounds.latency,
        percentile_changed,
    );
    let request_count = rebase(
        state.request_count.selected,
        state.request_count.bounds,
        bounds.request_count,
        false,
    );

    state.latency.selected = Some(latency);
    state.latency.bounds = Some(bounds.latency);
    state.request_count.selected = Some(request_count);
    state.request_count.bounds = Some(bounds.request_count);
    state.bounds_percentile = Some(state.percentile);

    let active_ranges = ActiveRanges {
        latency: is_active(latency, bounds.latency),
        request_count: is_active(request_count, bounds.request_count),
    };

    let filtered: Vec<Entity> = subset
        .into_iter()
        .filter(|e| range_passes(e, latency_kind, latency, bounds.latency))
        .filter(|e| range_passes(e, MetricKind::RequestCount, request_count, bounds.request_count))
        .cloned()
        .collect();

    if !state.auto_selected {
        if let Some(key) = default_selection(&filtered, settings.health_metric) {
            tracing::debug!("Auto-selected entity {}", key);
            state.selected_entity = Some(key);
            state.auto_selected = true;
        }
    }

    let badges = badges(&state, &active_ranges, settings);
    if has_data {
        state.phase = SessionPhase::Filtered;
    }

    FilterOutcome {
        entities: filtered,
        bounds,
        active_ranges,
        badges,
        selected_entity: state.selected_entity.clone(),
        state,
    }
}

/// Stage 1: text, category and threshold-bucket facets.
pub fn category_filter<'a>(
    entities: &'a [Entity],
    state: &FilterState,
    settings: &FilterSettings,
) -> Vec<&'a Entity> {
    let query = state.search.trim().to_lowercase();

    entities
        .iter()
        .filter(|e| {
            query.is_empty()
                || e.name.to_lowercase().contains(&query)
                || e.key.as_str().to_lowercase().contains(&query)
        })
        .filter(|e| state.names.is_empty() || state.names.contains(&e.name))
        .filter(|e| intersects(&state.operations, &e.operations))
        .filter(|e| intersects(&state.dependencies, &e.dependencies))
        .filter(|e| {
            state.attributes.iter().all(|(key, selected)| {
                selected.is_empty()
                    || e.attributes.get(key).is_some_and(|value| selected.contains(value))
            })
        })
        .filter(|e| {
            in_buckets(e, MetricKind::Availability, &state.availability, &settings.availability)
        })
        .filter(|e| in_buckets(e, MetricKind::FaultRate, &state.fault_rate, &settings.fault_rate))
        .filter(|e| in_buckets(e, MetricKind::ErrorRate, &state.error_rate, &settings.error_rate))
        .collect()
}

fn intersects(selected: &BTreeSet<String>, values: &[String]) -> bool {
    selected.is_empty() || values.iter().any(|v| selected.contains(v))
}

fn in_buckets(
    entity: &Entity,
    kind: MetricKind,
    selected: &BTreeSet<ThresholdBucket>,
    thresholds: &Thresholds,
) -> bool {
    if selected.is_empty() {
        return true;
    }
    entity
        .metric(kind)
        .is_some_and(|value| selected.contains(&thresholds.bucket_of(value)))
}

/// Stage 2: bounds over the category-filtered subset.
pub fn compute_bounds(subset: &[&Entity], latency_kind: MetricKind) -> FacetBounds {
    FacetBounds {
        latency: Bounds::from_values(
            subset.iter().filter_map(|e| e.metric(latency_kind)),
            DEFAULT_LATENCY_BOUNDS,
        ),
        request_count: Bounds::from_values(
            subset.iter().filter_map(|e| e.metric(MetricKind::RequestCount)),
            DEFAULT_REQUEST_COUNT_BOUNDS,
        ),
    }
}

/// Stage 3 predicate: a range is active iff it differs from the bounds.
pub fn is_active(selected: Bounds, bounds: Bounds) -> bool {
    selected.min != bounds.min || selected.max != bounds.max
}

fn range_passes(entity: &Entity, kind: MetricKind, selected: Bounds, bounds: Bounds) -> bool {
    if !is_active(selected, bounds) {
        return true;
    }
    entity.metric(kind).is_some_and(|value| selected.contains(value))
}

/// Stage 4: move the selected range onto new bounds.
///
/// Each edge that sat on the previous bound follows the new bound; an edge
/// the user moved stays put, clamped into `bounds`. `reset`, an unset
/// selection, or a range that no longer overlaps `bounds` snaps the whole
/// range to `bounds`.
pub fn rebase(
    selected: Option<Bounds>,
    previous: Option<Bounds>,
    bounds: Bounds,
    reset: bool,
) -> Bounds {
    let Some(selected) = selected else {
        return bounds;
    };
    if reset {
        return bounds;
    }

    let rebased = match previous {
        Some(previous) => Bounds::new(
            if selected.min == previous.min {
                bounds.min
            } else {
                selected.min
            },
            if selected.max == previous.max {
                bounds.max
            } else {
                selected.max
            },
        ),
        None => selected,
    };

    if rebased.min > rebased.max || rebased.max < bounds.min || rebased.min > bounds.max {
        return bounds;
    }

    Bounds::new(
        rebased.min.clamp(bounds.min, bounds.max),
        rebased.max.clamp(bounds.min, bounds.max),
    )
}

/// One badge per facet that differs from its default.
pub fn badges(state: &FilterState, active: &ActiveRanges, settings: &FilterSettings) -> Vec<Badge> {
    let mut badges = Vec::new();
    let mut push = |facet: FacetId, label: String, values: Vec<String>| {
        if !values.is_empty() {
            badges.push(Badge {
                facet,
                label,
                values,
            });
        }
    };

    let search = state.search.trim();
    if !search.is_empty() {
        push(FacetId::Search, "Search".to_string(), vec![search.to_string()]);
    }
    push(FacetId::Names, "Name".to_string(), state.names.iter().cloned().collect());
    push(
        FacetId::Operations,
        "Operation".to_string(),
        state.operations.iter().cloned().collect(),
    );
    push(
        FacetId::Dependencies,
        "Dependency".to_string(),
        state.dependencies.iter().cloned().collect(),
    );
    for (key, selected) in &state.attributes {
        push(
            FacetId::Attribute(key.clone()),
            key.clone(),
            selected.iter().cloned().collect(),
        );
    }

    let bucket_labels = |selected: &BTreeSet<ThresholdBucket>, thresholds: &Thresholds| {
        selected.iter().map(|b| b.label(thresholds)).collect::<Vec<_>>()
    };
    push(
        FacetId::Availability,
        "Availability".to_string(),
        bucket_labels(&state.availability, &settings.availability),
    );
    push(
        FacetId::FaultRate,
        "Fault rate".to_string(),
        bucket_labels(&state.fault_rate, &settings.fault_rate),
    );
    push(
        FacetId::ErrorRate,
        "Error rate".to_string(),
        bucket_labels(&state.error_rate, &settings.error_rate),
    );

    if active.latency {
        if let Some(range) = state.latency.selected {
            push(
                FacetId::Latency,
                format!("Latency ({})", state.percentile.as_str()),
                vec![format_range(range, &settings.latency_unit)],
            );
        }
    }
    if active.request_count {
        if let Some(range) = state.request_count.selected {
            push(
                FacetId::RequestCount,
                "Requests".to_string(),
                vec![format_range(range, "")],
            );
        }
    }

    badges
}

fn format_range(range: Bounds, unit: &str) -> String {
    format!("{}-{}{}", range.min, range.max, unit)
}

/// Entity with the lowest health value; the first one wins ties and
/// entities without a value are never chosen.
pub fn default_selection(entities: &[Entity], health: MetricKind) -> Option<EntityKey> {
    let mut best: Option<(&Entity, f64)> = None;
    for entity in entities {
        let value = entity.metric(health).unwrap_or(f64::INFINITY);
        if value == f64::INFINITY {
            continue;
        }
        if best.is_none_or(|(_, lowest)| value < lowest) {
            best = Some((entity, value));
        }
    }
    best.map(|(entity, _)| entity.key.clone())
}
