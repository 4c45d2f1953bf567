//! A small built-in network for demonstrations and smoke tests.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use signalbox_core::network::{
  NetworkSnapshot, PriorityClass, ResourceSection, SectionKind, TrainMovement, TrainStatus,
};

/// Four trains and six sections, taken at `now`.
///
/// IC-2501 and FR-8842 meet at Junction B within minutes, and EX-1247 and
/// LC-5603 contend for Platform 2 with Platforms 3, 4 and 5 free.
pub fn snapshot(now: DateTime<Utc>) -> NetworkSnapshot {
  let at = |minutes: i64| now + Duration::minutes(minutes);
  let movement = |id: &str,
                  route: &str,
                  position_miles: f64,
                  status: TrainStatus,
                  delay_minutes: u32,
                  priority: PriorityClass,
                  next_waypoint: &str,
                  estimated_arrival: DateTime<Utc>| TrainMovement {
    id: id.to_owned(),
    route: route.to_owned(),
    position_miles,
    status,
    delay_minutes,
    priority,
    next_waypoint: next_waypoint.to_owned(),
    estimated_arrival,
  };
  let section = |id: &str, name: &str, kind: SectionKind, capacity_percent: u8| ResourceSection {
    id: id.to_owned(),
    name: name.to_owned(),
    kind,
    capacity_percent,
    occupants: BTreeSet::new(),
    clearance_minutes: 3,
  };

  NetworkSnapshot {
    taken_at:    now,
    movements:   vec![
      movement(
        "IC-2501",
        "London → Manchester",
        127.3,
        TrainStatus::OnTime,
        0,
        PriorityClass::High,
        "JCT-B",
        at(3),
      ),
      movement(
        "FR-8842",
        "Manchester → Liverpool",
        89.7,
        TrainStatus::Delayed,
        8,
        PriorityClass::Medium,
        "JCT-B",
        at(4),
      ),
      movement(
        "LC-5603",
        "Liverpool → London",
        203.1,
        TrainStatus::OnTime,
        0,
        PriorityClass::High,
        "PLAT-2",
        at(11),
      ),
      movement(
        "EX-1247",
        "Birmingham → Cardiff",
        45.2,
        TrainStatus::Critical,
        15,
        PriorityClass::Critical,
        "PLAT-2",
        at(10),
      ),
    ],
    sections:    vec![
      section("JCT-B", "Junction B", SectionKind::Junction, 82),
      section("PLAT-2", "Platform 2", SectionKind::Platform, 92),
      section("PLAT-3", "Platform 3", SectionKind::Platform, 70),
      section("PLAT-4", "Platform 4", SectionKind::Platform, 35),
      section("PLAT-5", "Platform 5", SectionKind::Platform, 60),
      section("COR-A", "Corridor A", SectionKind::Corridor, 54),
    ],
    precedences: Vec::new(),
  }
}
