//! Workout extraction: one denormalized row per `Workout` element.

use crate::classify::parse_number;
use crate::export::WorkoutElement;
use crate::models::WorkoutSession;
use crate::timestamp::TimestampNormalizer;

/// Vendor prefix stripped from `workoutActivityType`.
pub const ACTIVITY_PREFIX: &str = "HKWorkoutActivityType";

/// The only `durationUnit` whose value is known to be minutes.
pub const MINUTES_UNIT: &str = "min";

/// Distance unit assumed when a statistic carries none.
pub const KILOMETERS_UNIT: &str = "km";

const ACTIVE_ENERGY: &str = "HKQuantityTypeIdentifierActiveEnergyBurned";
const DISTANCE_WALKING_RUNNING: &str = "HKQuantityTypeIdentifierDistanceWalkingRunning";
const DISTANCE_CYCLING: &str = "HKQuantityTypeIdentifierDistanceCycling";

/// Outcome of extracting one workout.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Session(WorkoutSession),
    /// The workout has no usable `startDate`.
    MissingStart,
}

/// Fold a workout element and its statistics into a [`WorkoutSession`].
///
/// Missing or unparseable statistics contribute `0`. Durations and distances
/// in units other than minutes and kilometres are kept at face value; their
/// units are stored alongside so the row can be identified later.
pub fn extract(element: WorkoutElement, normalizer: &mut TimestampNormalizer) -> Extracted {
    let WorkoutElement {
        activity_type,
        start_date,
        end_date,
        duration,
        duration_unit,
        source_name,
        statistics,
    } = element;

    let Some(start_date) = start_date.as_deref().map(|s| normalizer.normalize(s)) else {
        return Extracted::MissingStart;
    };
    let end_date = normalizer.normalize_opt(end_date.as_deref());
    let duration_unit = duration_unit.unwrap_or_else(|| MINUTES_UNIT.to_string());
    let duration_minutes = duration.as_deref().and_then(parse_number).unwrap_or(0.0);

    let mut energy = None;
    let mut walking_distance = None;
    let mut cycling_distance = None;
    for stat in &statistics {
        let slot = match stat.statistic_type.as_str() {
            ACTIVE_ENERGY => &mut energy,
            DISTANCE_WALKING_RUNNING => &mut walking_distance,
            DISTANCE_CYCLING => &mut cycling_distance,
            _ => continue,
        };
        if let Some(sum) = stat.sum.as_deref().and_then(parse_number) {
            *slot = Some((sum, stat.unit.as_deref()));
        }
    }
    let distance = walking_distance.or(cycling_distance);

    Extracted::Session(WorkoutSession {
        activity_type: activity_name(activity_type.as_deref().unwrap_or_default()),
        start_date,
        end_date,
        duration_minutes,
        duration_unit,
        total_energy_burned: energy.map_or(0.0, |(sum, _)| sum),
        total_distance_km: distance.map_or(0.0, |(sum, _)| sum),
        distance_unit: distance
            .and_then(|(_, unit)| unit)
            .unwrap_or(KILOMETERS_UNIT)
            .to_string(),
        source_name,
    })
}

/// Strip the vendor prefix; unknown activity kinds pass through otherwise untouched.
pub fn activity_name(raw: &str) -> String {
    raw.strip_prefix(ACTIVITY_PREFIX).unwrap_or(raw).to_string()
}

impl WorkoutSession {
    /// Whether `duration_minutes` is known to be in minutes.
    pub fn duration_is_minutes(&self) -> bool {
        self.duration_unit == MINUTES_UNIT
    }

    /// Whether `total_distance_km` is known to be in kilometres.
    pub fn distance_is_km(&self) -> bool {
        self.distance_unit == KILOMETERS_UNIT
    }
}
