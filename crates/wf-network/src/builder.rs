//! Incremental network builder.

use std::collections::HashSet;

use crate::error::{NetworkError, NetworkResult};
use crate::model::{
    HydraulicOptions, Junction, Network, Pattern, Pipe, Pump, Reservoir, Tank, TimeOptions, Valve,
};
use wf_core::Real;

/// Builder for constructing a network snapshot incrementally.
///
/// Use the `add_*` methods to build up the snapshot, then call `build()`
/// to validate and freeze it into an immutable [`Network`].
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    network: Network,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn junction(
        mut self,
        id: impl Into<String>,
        elevation: Real,
        base_demand: Real,
        pattern: Option<&str>,
    ) -> Self {
        self.network.junctions.push(Junction {
            id: id.into(),
            elevation,
            base_demand,
            pattern: pattern.map(str::to_owned),
        });
        self
    }

    pub fn tank(
        mut self,
        id: impl Into<String>,
        elevation: Real,
        init_level: Real,
        min_level: Real,
        max_level: Real,
        diameter: Real,
    ) -> Self {
        self.network.tanks.push(Tank {
            id: id.into(),
            elevation,
            init_level,
            min_level,
            max_level,
            diameter,
        });
        self
    }

    pub fn reservoir(mut self, id: impl Into<String>, head: Real) -> Self {
        self.network.reservoirs.push(Reservoir {
            id: id.into(),
            head,
        });
        self
    }

    pub fn pipe(
        mut self,
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        length: Real,
        diameter: Real,
        roughness: Real,
    ) -> Self {
        self.network.pipes.push(Pipe {
            id: id.into(),
            start: start.into(),
            end: end.into(),
            length,
            diameter,
            roughness,
        });
        self
    }

    pub fn pump(
        mut self,
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.network.pumps.push(Pump {
            id: id.into(),
            start: start.into(),
            end: end.into(),
        });
        self
    }

    pub fn valve(
        mut self,
        id: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.network.valves.push(Valve {
            id: id.into(),
            start: start.into(),
            end: end.into(),
        });
        self
    }

    pub fn pattern(mut self, id: impl Into<String>, multipliers: Vec<Real>) -> Self {
        self.network.patterns.push(Pattern {
            id: id.into(),
            multipliers,
        });
        self
    }

    pub fn hydraulics(mut self, options: HydraulicOptions) -> Self {
        self.network.hydraulics = options;
        self
    }

    pub fn times(mut self, options: TimeOptions) -> Self {
        self.network.times = options;
        self
    }

    /// Validate and freeze the snapshot.
    ///
    /// Checks id uniqueness per category, pattern references, physical
    /// parameter ranges, and time-option consistency. Link endpoint
    /// existence is deliberately left to extraction, which reports it as
    /// the fatal `MissingComponent` error.
    pub fn build(self) -> NetworkResult<Network> {
        let net = self.network;

        check_unique("junction", net.junctions.iter().map(|j| j.id.as_str()))?;
        check_unique("tank", net.tanks.iter().map(|t| t.id.as_str()))?;
        check_unique("reservoir", net.reservoirs.iter().map(|r| r.id.as_str()))?;
        check_unique(
            "link",
            net.pipes
                .iter()
                .map(|p| p.id.as_str())
                .chain(net.pumps.iter().map(|p| p.id.as_str()))
                .chain(net.valves.iter().map(|v| v.id.as_str())),
        )?;
        check_unique("pattern", net.patterns.iter().map(|p| p.id.as_str()))?;

        for pattern in &net.patterns {
            if pattern.multipliers.is_empty() {
                return Err(NetworkError::InvalidParameter {
                    element: pattern.id.clone(),
                    what: "pattern must have at least one multiplier",
                });
            }
        }

        let pattern_ids: HashSet<&str> = net.patterns.iter().map(|p| p.id.as_str()).collect();
        for junction in &net.junctions {
            if let Some(pattern) = &junction.pattern {
                if !pattern_ids.contains(pattern.as_str()) {
                    return Err(NetworkError::MissingPattern {
                        junction: junction.id.clone(),
                        pattern: pattern.clone(),
                    });
                }
            }
        }
        if let Some(pattern) = &net.hydraulics.default_pattern {
            if !pattern_ids.contains(pattern.as_str()) {
                return Err(NetworkError::MissingPattern {
                    junction: "<default>".into(),
                    pattern: pattern.clone(),
                });
            }
        }

        for pipe in &net.pipes {
            if pipe.length <= 0.0 || pipe.diameter <= 0.0 || pipe.roughness <= 0.0 {
                return Err(NetworkError::InvalidParameter {
                    element: pipe.id.clone(),
                    what: "pipe length, diameter and roughness must be positive",
                });
            }
        }
        for tank in &net.tanks {
            if tank.diameter <= 0.0 {
                return Err(NetworkError::InvalidParameter {
                    element: tank.id.clone(),
                    what: "tank diameter must be positive",
                });
            }
            if !(tank.min_level <= tank.init_level && tank.init_level <= tank.max_level) {
                return Err(NetworkError::InvalidParameter {
                    element: tank.id.clone(),
                    what: "tank levels must satisfy min <= init <= max",
                });
            }
        }

        if net.hydraulics.service_pressure <= net.hydraulics.minimum_pressure {
            return Err(NetworkError::InvalidParameter {
                element: "<options>".into(),
                what: "service pressure must exceed minimum pressure",
            });
        }

        let t = &net.times;
        if t.hydraulic_timestep == 0 || t.pattern_timestep == 0 || t.report_timestep == 0 {
            return Err(NetworkError::InvalidTimeOptions {
                what: "timesteps must be positive",
            });
        }
        if t.report_start > t.duration {
            return Err(NetworkError::InvalidTimeOptions {
                what: "report start is beyond the simulation duration",
            });
        }

        Ok(net)
    }
}

fn check_unique<'a>(
    category: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> NetworkResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(NetworkError::DuplicateId {
                category,
                id: id.to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> NetworkBuilder {
        NetworkBuilder::new()
            .reservoir("r1", 50.0)
            .junction("j1", 0.0, 0.01, None)
            .pipe("p1", "r1", "j1", 1000.0, 0.3, 130.0)
    }

    #[test]
    fn builds_valid_network() {
        let net = small().build().unwrap();
        assert_eq!(net.node_count(), 2);
        assert_eq!(net.pipes.len(), 1);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = small().reservoir("r1", 10.0).build().unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateId { .. }));
    }

    #[test]
    fn rejects_unknown_pattern() {
        let err = NetworkBuilder::new()
            .junction("j1", 0.0, 0.01, Some("nope"))
            .build()
            .unwrap_err();
        assert!(matches!(err, NetworkError::MissingPattern { .. }));
    }

    #[test]
    fn rejects_nonpositive_pipe_geometry() {
        let err = NetworkBuilder::new()
            .pipe("p1", "a", "b", -1.0, 0.3, 130.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidParameter { .. }));
    }

    #[test]
    fn rejects_empty_pattern() {
        let err = small()
            .pattern("empty", vec![])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::InvalidParameter { ref element, .. } if element == "empty"
        ));
    }

    #[test]
    fn allows_dangling_endpoints_until_extraction() {
        // Endpoint resolution is an extraction-time concern.
        assert!(
            NetworkBuilder::new()
                .pipe("p1", "ghost", "also-ghost", 10.0, 0.1, 100.0)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn rejects_inverted_pda_thresholds() {
        let err = small()
            .hydraulics(HydraulicOptions {
                minimum_pressure: 30.0,
                service_pressure: 10.0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidParameter { .. }));
    }
}
