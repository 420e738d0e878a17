//! Report DTOs (§6, wire-exact for JSON output) and probe selection logic
//! (§4.5). Conversion from the in-memory model happens here so that
//! staleness — a report-time-only property (P4) — has exactly one place it
//! can be computed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisSet};
use crate::metadata::CheckMetadata;
use crate::result::CheckResult;
use crate::service_info::ServiceInfo;
use crate::status::{EntityRef, Link, ResponsibleRef, StatusPart, Throwable};

/// DTO schema version emitted in every report (§6).
pub const DTO_VERSION: &str = "0.3";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AxesDto {
    pub specified: Vec<Axis>,
    pub activated: Vec<Axis>,
}

impl AxesDto {
    fn from_sets(specified: &AxisSet, activated: &AxisSet) -> Self {
        Self {
            specified: specified.iter().collect(),
            activated: activated.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDto {
    pub class_name: String,
    pub message: String,
    pub stack_trace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkDto {
    pub display_text: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntityRefDto {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPartDto {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axes: Option<AxesDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_entities: Option<Vec<EntityRefDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkDto>,
    pub responsible_teams: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusDto {
    pub running_time_in_ns: u64,
    pub check_started: DateTime<Utc>,
    pub check_completed: DateTime<Utc>,
    pub stale_after: DateTime<Utc>,
    pub stale: bool,
    pub slow: bool,
    pub crashed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckDto {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub check_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<String>,
    pub axes: AxesDto,
    pub statuses: Vec<StatusPartDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<String>,
    pub run_status: RunStatusDto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfoDto {
    pub host: String,
    pub project: String,
    pub cpus: u32,
    pub os: String,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub load_average_one_min: f64,
    pub running_since: DateTime<Utc>,
    pub time_now: DateTime<Utc>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportDto {
    pub version: String,
    pub service: ServiceInfoDto,
    pub health_checks: Vec<HealthCheckDto>,
    pub axes: AxesDto,
    pub ready: bool,
    pub live: bool,
    pub critical_fault: bool,
    pub synchronous: bool,
}

/// Converts one `StatusPart` into its wire DTO. `specified`/`activated` for
/// a `WithAxes` part is the part's own axis map, not the whole result's
/// aggregate — each status line reports what it, individually, declared.
pub(crate) fn status_part_to_dto(part: &StatusPart) -> StatusPartDto {
    match part {
        StatusPart::Info { text } => StatusPartDto {
            description: text.clone(),
            axes: None,
            affected_entities: None,
            exception: None,
            link: None,
            responsible_teams: Vec::new(),
        },
        StatusPart::LinkPart { link } => StatusPartDto {
            description: link.display_text.clone(),
            axes: None,
            affected_entities: None,
            exception: None,
            link: Some(LinkDto {
                display_text: link.display_text.clone(),
                url: link.url.clone(),
            }),
            responsible_teams: Vec::new(),
        },
        StatusPart::WithAxes {
            responsible_teams,
            description,
            axis_map,
            affected_entities,
            ..
        } => {
            let specified: AxisSet = axis_map.iter().map(|(a, _)| *a).collect();
            let activated: AxisSet = axis_map
                .iter()
                .filter(|(_, v)| *v)
                .map(|(a, _)| *a)
                .collect();
            StatusPartDto {
                description: description.clone(),
                axes: Some(AxesDto::from_sets(&specified, &activated)),
                affected_entities: affected_entities.as_ref().map(|set| {
                    set.iter()
                        .map(|e| EntityRefDto {
                            entity_type: e.entity_type.clone(),
                            id: e.id.clone(),
                        })
                        .collect()
                }),
                exception: None,
                link: None,
                responsible_teams: responsible_teams.iter().map(|t| t.as_str().to_string()).collect(),
            }
        }
        StatusPart::WithThrowable {
            description,
            throwable,
            unhandled,
        } => StatusPartDto {
            description: description.clone().unwrap_or_else(|| throwable.message.clone()),
            axes: if *unhandled {
                Some(AxesDto::from_sets(
                    &[Axis::SysCrashed].into_iter().collect(),
                    &[Axis::SysCrashed].into_iter().collect(),
                ))
            } else {
                None
            },
            affected_entities: None,
            exception: Some(ExceptionDto {
                class_name: throwable.class_name.clone(),
                message: throwable.message.clone(),
                stack_trace: throwable.stack_trace.clone(),
            }),
            link: None,
            responsible_teams: Vec::new(),
        },
    }
}

/// Reconstructs a [`StatusPart`] from its wire DTO (P12 — DTO round-trip).
/// Lossy in one documented way: the wire format has no `staticCompareString`
/// field (§6 lists the status-part fields and it isn't among them), so a
/// `WithAxes` part that used a compare string instead of affected entities
/// round-trips with `static_compare_string: None`. Everything else the
/// structural-equality rule inspects — axis map, entities, description,
/// responsible teams — survives exactly.
pub fn status_part_from_dto(dto: &StatusPartDto) -> StatusPart {
    if let Some(exception) = &dto.exception {
        let throwable = Throwable {
            class_name: exception.class_name.clone(),
            message: exception.message.clone(),
            stack_trace: exception.stack_trace.clone(),
        };
        let unhandled = dto
            .axes
            .as_ref()
            .is_some_and(|a| a.activated.contains(&Axis::SysCrashed));
        return StatusPart::WithThrowable {
            description: Some(dto.description.clone()),
            throwable,
            unhandled,
        };
    }
    if let Some(link) = &dto.link {
        return StatusPart::LinkPart {
            link: Link {
                display_text: link.display_text.clone(),
                url: link.url.clone(),
            },
        };
    }
    match &dto.axes {
        None => StatusPart::Info {
            text: dto.description.clone(),
        },
        Some(axes) => {
            let activated: AxisSet = axes.activated.iter().copied().collect();
            let axis_map: Vec<(Axis, bool)> = axes
                .specified
                .iter()
                .map(|axis| (*axis, activated.contains(*axis)))
                .collect();
            StatusPart::WithAxes {
                responsible_teams: dto
                    .responsible_teams
                    .iter()
                    .map(|s| ResponsibleRef::from(s.as_str()))
                    .collect(),
                description: dto.description.clone(),
                axis_map,
                affected_entities: dto.affected_entities.as_ref().map(|entities| {
                    entities
                        .iter()
                        .map(|e| EntityRef::new(e.entity_type.clone(), e.id.clone()))
                        .collect()
                }),
                static_compare_string: None,
            }
        }
    }
}

/// Convert one cached result into its DTO, applying the report-time-only
/// staleness rule (§4.5 step 4, P4): staleness is computed against `now`
/// and is never persisted back onto the `CheckResult`.
pub fn check_result_to_dto(metadata: &CheckMetadata, result: &CheckResult, now: DateTime<Utc>) -> HealthCheckDto {
    let stale_after = result.stale_after();
    let stale = now > stale_after;

    let mut specified = AxisSet::new();
    for part in &result.parts {
        specified.extend(&part.declared_axes());
    }
    let mut activated = result.aggregated_axes();
    if stale {
        activated.insert(Axis::SysStale);
    }

    HealthCheckDto {
        name: metadata.name.clone(),
        description: metadata.description.clone(),
        check_type: metadata.check_type.clone(),
        on_behalf_of: metadata.on_behalf_of.clone(),
        axes: AxesDto::from_sets(&specified, &activated),
        statuses: result.parts.iter().map(status_part_to_dto).collect(),
        structured_data: result.structured_data.clone(),
        run_status: RunStatusDto {
            running_time_in_ns: result.running_time_ns,
            check_started: result.check_started,
            check_completed: result.check_completed,
            stale_after,
            stale,
            slow: result.slow(),
            crashed: result.crashed(),
        },
    }
}

pub fn service_info_to_dto(info: &ServiceInfo, now: DateTime<Utc>) -> ServiceInfoDto {
    ServiceInfoDto {
        host: info.host.clone(),
        project: info.project.clone(),
        cpus: info.cpus,
        os: info.os.clone(),
        memory_total_bytes: info.memory_total_bytes,
        memory_used_bytes: info.memory_used_bytes,
        load_average_one_min: info.load_average_one_min,
        running_since: info.running_since,
        time_now: now,
        properties: info.properties.clone(),
    }
}

/// Aggregate axes across a set of health-check DTOs into the report-level
/// axes, plus the `ready`/`live`/`criticalFault` convenience flags (§4.5
/// step 5).
pub fn aggregate(checks: &[HealthCheckDto]) -> (AxesDto, bool, bool, bool) {
    let mut specified = AxisSet::new();
    let mut activated = AxisSet::new();
    for c in checks {
        specified.extend(&c.axes.specified.iter().copied().collect());
        activated.extend(&c.axes.activated.iter().copied().collect());
    }
    let ready = !activated.contains(Axis::NotReady);
    let live = !activated.contains(Axis::RequiresReboot);
    let critical_fault = activated.contains(Axis::CriticalWakePeopleUp);
    (AxesDto::from_sets(&specified, &activated), ready, live, critical_fault)
}

/// The specialised probe views (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Startup,
    Readiness,
    Liveness,
    Critical,
}

impl Probe {
    /// The axis a check must declare to be included in this probe's view.
    pub fn gate_axis(self) -> Axis {
        match self {
            Probe::Startup | Probe::Readiness => Axis::NotReady,
            Probe::Liveness => Axis::RequiresReboot,
            Probe::Critical => Axis::CriticalWakePeopleUp,
        }
    }
}

/// Request object for [`crate::registry::Registry::create_report`] (§6).
#[derive(Debug, Clone, Default)]
pub struct CreateReportRequest {
    /// Include only checks whose declared axis set intersects this set.
    /// `None` means include all checks.
    pub axes: Option<AxisSet>,
    pub exclude_checks: std::collections::HashSet<String>,
    pub force_fresh_data: bool,
}
