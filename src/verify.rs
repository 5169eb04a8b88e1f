// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeMap;

use crate::audio::SampleBuffer;
use crate::instrument::Zone;

/// Severity level for a verification issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single verification issue found during checking.
#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: Severity,
    pub category: &'static str,
    /// Index of the zone in the preset, if the issue belongs to one.
    pub zone: Option<usize>,
    pub message: String,
}

/// Result of verifying an instrument.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub issues: Vec<Issue>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: VerificationReport) {
        self.issues.extend(other.issues);
    }
}

/// Checks each zone's own invariants.
pub fn check_zone_parameters(zones: &[Zone]) -> Vec<Issue> {
    zones
        .iter()
        .enumerate()
        .filter_map(|(index, zone)| {
            zone.validate().err().map(|e| Issue {
                severity: Severity::Error,
                category: "zone-parameters",
                zone: Some(index),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Checks that every zone starts, and loops, inside the buffer.
pub fn check_buffer_bounds(zones: &[Zone], buffer: &SampleBuffer, master_offset: f64) -> Vec<Issue> {
    let duration = buffer.duration();
    let mut issues = Vec::new();
    for (index, zone) in zones.iter().enumerate() {
        let start = zone.source_offset(master_offset);
        if start >= duration {
            issues.push(Issue {
                severity: Severity::Error,
                category: "buffer-bounds",
                zone: Some(index),
                message: format!(
                    "zone starts at {:.3}s but the buffer is {:.3}s long",
                    start, duration
                ),
            });
            continue;
        }

        if let Some(region) = zone.loop_region(master_offset) {
            if region.end > duration {
                issues.push(Issue {
                    severity: Severity::Error,
                    category: "loop-bounds",
                    zone: Some(index),
                    message: format!(
                        "loop ends at {:.3}s but the buffer is {:.3}s long",
                        region.end, duration
                    ),
                });
            }
        }
    }
    issues
}

/// Warns about zones that can never be heard.
pub fn check_silent_zones(zones: &[Zone]) -> Vec<Issue> {
    zones
        .iter()
        .enumerate()
        .filter(|(_, zone)| zone.gain() == 0.0)
        .map(|(index, _)| Issue {
            severity: Severity::Warning,
            category: "gain",
            zone: Some(index),
            message: "zone has zero gain and is always silent".to_string(),
        })
        .collect()
}

/// Warns about keys between the lowest and highest mapped key that no zone
/// plays.
pub fn check_key_coverage(zones: &[Zone]) -> Vec<Issue> {
    let Some(lowest) = zones.iter().map(Zone::key_range_start).min() else {
        return Vec::new();
    };
    let highest = zones
        .iter()
        .map(Zone::key_range_end)
        .max()
        .unwrap_or(lowest);

    let mut gaps: Vec<(u8, u8)> = Vec::new();
    for key in lowest..=highest {
        if zones.iter().any(|zone| zone.matches(key)) {
            continue;
        }
        match gaps.last_mut() {
            Some((_, end)) if *end + 1 == key => *end = key,
            _ => gaps.push((key, key)),
        }
    }

    gaps.into_iter()
        .map(|(start, end)| Issue {
            severity: Severity::Warning,
            category: "key-coverage",
            zone: None,
            message: if start == end {
                format!("key {} is not mapped to any zone", start)
            } else {
                format!("keys {}..={} are not mapped to any zone", start, end)
            },
        })
        .collect()
}

/// Runs every check against an instrument's zones and buffer.
pub fn verify_instrument(
    zones: &[Zone],
    buffer: &SampleBuffer,
    master_offset: f64,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    report.issues.extend(check_zone_parameters(zones));
    report
        .issues
        .extend(check_buffer_bounds(zones, buffer, master_offset));
    report.issues.extend(check_silent_zones(zones));
    report.issues.extend(check_key_coverage(zones));
    report
}

/// Prints a verification report grouped by zone.
pub fn print_report(report: &VerificationReport, zones: &[Zone]) {
    if report.is_clean() {
        println!("\u{2705} All {} zone(s) passed verification.", zones.len());
        return;
    }

    let mut by_zone: BTreeMap<Option<usize>, Vec<&Issue>> = BTreeMap::new();
    for issue in &report.issues {
        by_zone.entry(issue.zone).or_default().push(issue);
    }

    for (zone, issues) in &by_zone {
        let has_errors = issues.iter().any(|i| i.severity == Severity::Error);
        let icon = if has_errors {
            "\u{274c}"
        } else {
            "\u{26a0}\u{fe0f} "
        };
        match zone.and_then(|index| zones.get(index).map(|z| (index, z))) {
            Some((index, z)) => println!(
                "{} zone {} (key {}, keys {}..={})",
                icon,
                index,
                z.key(),
                z.key_range_start(),
                z.key_range_end()
            ),
            None => println!("{} instrument", icon),
        }
        for issue in issues {
            let severity_icon = match issue.severity {
                Severity::Warning => "\u{26a0}\u{fe0f} ",
                Severity::Error => "\u{274c}",
            };
            println!(
                "   {} [{}] {}",
                severity_icon, issue.category, issue.message
            );
        }
    }

    println!("\nSummary: {} issue(s) found.", report.issues.len());
}
