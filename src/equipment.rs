use std::collections::HashMap;

use crate::domain::classification::Severity;

/// Upper/lower/range bound describing where the warning and critical bands
/// of a metric sit relative to its normal range (SPEC_FULL §6.1).
#[derive(Debug, Clone, Copy)]
pub enum Bound {
    Max(f64),
    Min(f64),
    Range(f64, f64),
}

impl Bound {
    /// True if `value` falls outside (more extreme than) this bound.
    fn exceeded_by(&self, value: f64) -> bool {
        match *self {
            Bound::Max(max) => value >= max,
            Bound::Min(min) => value <= min,
            Bound::Range(lo, hi) => value <= lo || value >= hi,
        }
    }
}

/// One metric's quartile/bound table for one equipment type (SPEC_FULL §6.1),
/// translated from `config/equipment_thresholds.py`.
#[derive(Debug, Clone)]
pub struct MetricThresholds {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub normal_range: (f64, f64),
    pub warning_bound: Bound,
    pub critical_bound: Bound,
    pub unit: &'static str,
}

/// A structured telemetry reading accompanying a chat turn, if the caller
/// supplied one (SPEC_FULL §6.1). Out of scope is how it reaches the HTTP
/// surface; its contract with the Classifier is fixed here.
#[derive(Debug, Clone)]
pub struct NumericReading {
    pub equipment_type: String,
    pub metric: String,
    pub value: f64,
}

/// Static table of equipment/metric threshold bands (SPEC_FULL §2.1, §6.1).
pub struct EquipmentThresholds {
    table: HashMap<(&'static str, &'static str), MetricThresholds>,
}

impl EquipmentThresholds {
    pub fn lookup(&self, equipment_type: &str, metric: &str) -> Option<&MetricThresholds> {
        self.table
            .iter()
            .find(|((eq, m), _)| eq.eq_ignore_ascii_case(equipment_type) && m.eq_ignore_ascii_case(metric))
            .map(|(_, t)| t)
    }

    /// Escalates severity to `critical` if `reading` falls in the critical
    /// band for its equipment/metric pair, leaves `current` untouched
    /// otherwise (SPEC_FULL §6.1: "escalates severity ... when value falls
    /// in the critical band", never de-escalates).
    pub fn escalate(&self, current: Severity, reading: &NumericReading) -> Severity {
        match self.lookup(&reading.equipment_type, &reading.metric) {
            Some(t) if t.critical_bound.exceeded_by(reading.value) => Severity::Critical,
            Some(t) if t.warning_bound.exceeded_by(reading.value) && current < Severity::High => {
                Severity::High
            }
            _ => current,
        }
    }

    pub fn default_table() -> Self {
        let mut table = HashMap::new();
        table.insert(
            ("PRESS", "PRESSURE"),
            MetricThresholds {
                q1: 75.0,
                q2: 85.0,
                q3: 95.0,
                normal_range: (75.0, 95.0),
                warning_bound: Bound::Range(65.0, 105.0),
                critical_bound: Bound::Max(125.0),
                unit: "bar",
            },
        );
        table.insert(
            ("PRESS", "VIBRATION"),
            MetricThresholds {
                q1: 3.2,
                q2: 5.8,
                q3: 8.5,
                normal_range: (3.2, 8.5),
                warning_bound: Bound::Max(12.0),
                critical_bound: Bound::Max(15.0),
                unit: "mm/s",
            },
        );
        table.insert(
            ("PRESS", "CURRENT"),
            MetricThresholds {
                q1: 4.8,
                q2: 5.5,
                q3: 6.2,
                normal_range: (4.8, 6.2),
                warning_bound: Bound::Max(8.0),
                critical_bound: Bound::Max(10.0),
                unit: "A",
            },
        );
        table.insert(
            ("WELD", "SENSOR_VALUE"),
            MetricThresholds {
                q1: 8.5,
                q2: 10.4,
                q3: 12.3,
                normal_range: (8.5, 12.3),
                warning_bound: Bound::Min(7.0),
                critical_bound: Bound::Min(5.0),
                unit: "V",
            },
        );
        table.insert(
            ("WELD", "TEMPERATURE"),
            MetricThresholds {
                q1: 180.0,
                q2: 200.0,
                q3: 220.0,
                normal_range: (180.0, 220.0),
                warning_bound: Bound::Max(250.0),
                critical_bound: Bound::Max(300.0),
                unit: "\u{b0}C",
            },
        );
        table.insert(
            ("PAINT", "THICKNESS"),
            MetricThresholds {
                q1: 22.0,
                q2: 25.0,
                q3: 28.0,
                normal_range: (22.0, 28.0),
                warning_bound: Bound::Min(18.0),
                critical_bound: Bound::Min(15.0),
                unit: "\u{b5}m",
            },
        );
        table.insert(
            ("PAINT", "VOLTAGE"),
            MetricThresholds {
                q1: 215.0,
                q2: 225.0,
                q3: 235.0,
                normal_range: (215.0, 235.0),
                warning_bound: Bound::Range(200.0, 250.0),
                critical_bound: Bound::Range(180.0, 270.0),
                unit: "V",
            },
        );
        table.insert(
            ("PAINT", "TEMPERATURE"),
            MetricThresholds {
                q1: 60.0,
                q2: 70.0,
                q3: 80.0,
                normal_range: (60.0, 80.0),
                warning_bound: Bound::Max(90.0),
                critical_bound: Bound::Max(100.0),
                unit: "\u{b0}C",
            },
        );
        table.insert(
            ("VEHICLE", "ASSEMBLY_FORCE"),
            MetricThresholds {
                q1: 150.0,
                q2: 175.0,
                q3: 200.0,
                normal_range: (150.0, 200.0),
                warning_bound: Bound::Max(250.0),
                critical_bound: Bound::Max(300.0),
                unit: "N",
            },
        );
        Self { table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_pressure_escalates() {
        let thresholds = EquipmentThresholds::default_table();
        let reading = NumericReading {
            equipment_type: "PRESS".to_string(),
            metric: "PRESSURE".to_string(),
            value: 130.0,
        };
        assert_eq!(
            thresholds.escalate(Severity::Low, &reading),
            Severity::Critical
        );
    }

    #[test]
    fn normal_reading_does_not_escalate() {
        let thresholds = EquipmentThresholds::default_table();
        let reading = NumericReading {
            equipment_type: "PRESS".to_string(),
            metric: "PRESSURE".to_string(),
            value: 80.0,
        };
        assert_eq!(
            thresholds.escalate(Severity::Low, &reading),
            Severity::Low
        );
    }

    #[test]
    fn unknown_equipment_leaves_severity_untouched() {
        let thresholds = EquipmentThresholds::default_table();
        let reading = NumericReading {
            equipment_type: "UNKNOWN".to_string(),
            metric: "X".to_string(),
            value: 1.0,
        };
        assert_eq!(
            thresholds.escalate(Severity::Normal, &reading),
            Severity::Normal
        );
    }
}
