//! Rule checks for a single proposed lesson.
//!
//! Every rule runs on every call and all violations are returned together.
//! Only structural problems (unknown ids) become errors.

use log::trace;
use serde_json::{Map, Value, json};

use crate::busy::{Booking, LessonSource};
use crate::data::{
    Building, Candidate, CheckOutcome, Group, Room, TimeSlot, Violation, ViolationCode,
    week_bounds, weekday_index,
};
use crate::directory::Directory;
use crate::error::{CoreError, CoreResult};

const REQUIRED_FIELDS: [&str; 5] = ["date", "group_id", "subject_id", "teacher_id", "time_slot_id"];

fn bad_request(details: Value) -> Violation {
    Violation::new(ViolationCode::BadRequest, details)
}

fn parse_error(field: &str, problem: &str) -> Violation {
    bad_request(json!({ "reason": format!("parse_error: {field} {problem}") }))
}

fn parse_id(object: &Map<String, Value>, field: &str) -> Result<Option<u32>, Violation> {
    let id = match object.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    id.map(Some)
        .ok_or_else(|| parse_error(field, "must be a non-negative integer"))
}

fn parse_flag(object: &Map<String, Value>, field: &str) -> Result<bool, Violation> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(parse_error(field, "must be a boolean")),
    }
}

/// Reads a candidate from a loosely typed JSON request.
///
/// Any missing required field yields a single `BAD_REQUEST` listing all of
/// them; ids may be numbers or numeric strings.
pub fn parse_candidate(payload: &Value) -> Result<Candidate, Violation> {
    let Some(object) = payload.as_object() else {
        return Err(bad_request(json!({ "reason": "expected a JSON object" })));
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| object.get(*field).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(bad_request(json!({ "missing": missing })));
    }

    let date = object
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| parse_error("date", "must be an ISO 8601 date"))?;
    if week_bounds(date).is_none() {
        return Err(parse_error("date", "out of range"));
    }
    // required ids are present, so None cannot come back here
    let required = |field: &str| -> Result<u32, Violation> {
        parse_id(object, field)?.ok_or_else(|| parse_error(field, "is missing"))
    };

    Ok(Candidate {
        date,
        time_slot_id: required("time_slot_id")?,
        group_id: required("group_id")?,
        subject_id: required("subject_id")?,
        teacher_id: required("teacher_id")?,
        room_id: parse_id(object, "room_id")?,
        lesson_type_id: parse_id(object, "lesson_type_id")?,
        is_remote: parse_flag(object, "is_remote")?,
        requires_computers: parse_flag(object, "requires_computers")?,
    })
}

/// Everything a candidate references, looked up once.
struct Resolved {
    group: Group,
    slot: TimeSlot,
    room: Option<(Room, Building)>,
}

/// Validates candidates against the directory and a view of booked lessons.
pub struct ConstraintChecker<'a, D: Directory + ?Sized, L: LessonSource + ?Sized> {
    directory: &'a D,
    lessons: &'a L,
}

impl<'a, D: Directory + ?Sized, L: LessonSource + ?Sized> ConstraintChecker<'a, D, L> {
    pub fn new(directory: &'a D, lessons: &'a L) -> Self {
        Self { directory, lessons }
    }

    /// Parses and checks a raw request; malformed input is a `BAD_REQUEST`
    /// outcome rather than an error.
    pub fn check_json(&self, payload: &Value) -> CoreResult<CheckOutcome> {
        match parse_candidate(payload) {
            Ok(candidate) => self.check(&candidate),
            Err(violation) => Ok(CheckOutcome::from_violations(vec![violation])),
        }
    }

    pub fn check(&self, candidate: &Candidate) -> CoreResult<CheckOutcome> {
        let resolved = self.resolve(candidate)?;

        let mut violations = self.busy(candidate);
        violations.extend(self.teacher_limit(candidate, &resolved.slot));
        violations.extend(self.teacher_availability(candidate, &resolved.slot));
        violations.extend(self.curriculum(candidate, &resolved.slot));
        if let Some((room, building)) = resolved.room.as_ref().filter(|_| !candidate.is_remote) {
            violations.extend(room_capacity(&resolved.group, room));
            violations.extend(room_computers(&resolved.group, room, candidate.requires_computers));
            violations.extend(invalid_building(&resolved.group, room, building));
        }

        trace!(
            "Checked group {} / teacher {} on {} slot {}: {} violation(s)",
            candidate.group_id,
            candidate.teacher_id,
            candidate.date,
            candidate.time_slot_id,
            violations.len()
        );
        Ok(CheckOutcome::from_violations(violations))
    }

    fn resolve(&self, candidate: &Candidate) -> CoreResult<Resolved> {
        let dir = self.directory;
        let group = dir
            .group(candidate.group_id)
            .ok_or_else(|| CoreError::not_found("group", candidate.group_id))?;
        dir.teacher(candidate.teacher_id)
            .ok_or_else(|| CoreError::not_found("teacher", candidate.teacher_id))?;
        dir.subject(candidate.subject_id)
            .ok_or_else(|| CoreError::not_found("subject", candidate.subject_id))?;
        let slot = dir
            .time_slot(candidate.time_slot_id)
            .ok_or_else(|| CoreError::not_found("time slot", candidate.time_slot_id))?;

        let room = match candidate.room_id {
            Some(room_id) => {
                let room = dir
                    .room(room_id)
                    .ok_or_else(|| CoreError::not_found("room", room_id))?;
                let building = dir
                    .building(room.building_id)
                    .ok_or_else(|| CoreError::not_found("building", room.building_id))?;
                Some((room, building))
            }
            None => None,
        };
        Ok(Resolved { group, slot, room })
    }

    fn hours_of(&self, bookings: &[Booking]) -> f64 {
        bookings
            .iter()
            .filter_map(|b| self.directory.time_slot(b.time_slot_id))
            .map(|slot| slot.duration_hours())
            .sum()
    }

    fn busy(&self, candidate: &Candidate) -> Vec<Violation> {
        let room_id = candidate.occupied_room();
        let mut teacher = None;
        let mut group = None;
        let mut room = None;

        for booking in self.lessons.bookings_at(candidate.date, candidate.time_slot_id) {
            let details = || json!({ "lesson_id": booking.lesson_id });
            if teacher.is_none() && booking.teacher_id == candidate.teacher_id {
                teacher = Some(Violation::new(ViolationCode::TeacherBusy, details()));
            }
            if group.is_none() && booking.group_id == candidate.group_id {
                group = Some(Violation::new(ViolationCode::GroupBusy, details()));
            }
            if room.is_none() && room_id.is_some() && booking.room_id == room_id {
                room = Some(Violation::new(ViolationCode::RoomBusy, details()));
            }
        }
        [teacher, group, room].into_iter().flatten().collect()
    }

    fn teacher_limit(&self, candidate: &Candidate, slot: &TimeSlot) -> Option<Violation> {
        if !self.directory.has_workload_limits() {
            return None;
        }
        let limit = self.directory.workload_limit(candidate.teacher_id)?;
        let (week_start, week_end) = week_bounds(candidate.date)?;
        let booked = self
            .lessons
            .teacher_bookings_between(candidate.teacher_id, week_start, week_end);
        let hours = self.hours_of(&booked) + slot.duration_hours();

        (hours > limit.hours_per_week).then(|| {
            Violation::new(
                ViolationCode::TeacherLimitExceeded,
                json!({
                    "teacher_id": candidate.teacher_id,
                    "hours": hours,
                    "limit": limit.hours_per_week,
                }),
            )
        })
    }

    /// No row for the weekday means the teacher does not work that day.
    fn teacher_availability(&self, candidate: &Candidate, slot: &TimeSlot) -> Option<Violation> {
        let weekday = weekday_index(candidate.date);
        let unavailable = |details: Value| {
            Some(Violation::new(ViolationCode::TeacherNotAvailable, details))
        };

        let Some(window) = self
            .directory
            .availability(candidate.teacher_id, weekday)
            .filter(|w| !w.is_day_off)
        else {
            return unavailable(json!({ "teacher_id": candidate.teacher_id, "weekday": weekday }));
        };

        let starts_early = window.available_from.is_some_and(|from| slot.start_time < from);
        let ends_late = window.available_to.is_some_and(|to| slot.end_time > to);
        if starts_early || ends_late {
            return unavailable(json!({
                "teacher_id": candidate.teacher_id,
                "weekday": weekday,
                "from": window.available_from,
                "to": window.available_to,
            }));
        }
        None
    }

    fn curriculum(&self, candidate: &Candidate, slot: &TimeSlot) -> Option<Violation> {
        let plan = self
            .directory
            .curriculum(candidate.group_id, candidate.subject_id)?;
        let booked = self
            .lessons
            .group_subject_bookings(candidate.group_id, candidate.subject_id);
        let used = self.hours_of(&booked);
        let planned = used + slot.duration_hours();

        (planned > plan.total_hours).then(|| {
            Violation::new(
                ViolationCode::CurriculumHoursExceeded,
                json!({
                    "group_id": candidate.group_id,
                    "subject_id": candidate.subject_id,
                    "used_hours": used,
                    "planned_hours": planned,
                    "limit": plan.total_hours,
                }),
            )
        })
    }
}

fn room_capacity(group: &Group, room: &Room) -> Option<Violation> {
    (group.students_count > room.capacity).then(|| {
        Violation::new(
            ViolationCode::RoomCapacityExceeded,
            json!({
                "group_id": group.id,
                "room_id": room.id,
                "students": group.students_count,
                "capacity": room.capacity,
            }),
        )
    })
}

fn room_computers(group: &Group, room: &Room, requires_computers: bool) -> Option<Violation> {
    (requires_computers && group.students_count > room.computers_count).then(|| {
        Violation::new(
            ViolationCode::RoomComputersNotEnough,
            json!({
                "group_id": group.id,
                "room_id": room.id,
                "students": group.students_count,
                "computers": room.computers_count,
            }),
        )
    })
}

fn invalid_building(group: &Group, room: &Room, building: &Building) -> Option<Violation> {
    let kind = building.kind?;
    (kind != group.education_level).then(|| {
        Violation::new(
            ViolationCode::InvalidBuilding,
            json!({
                "group_id": group.id,
                "room_id": room.id,
                "building_type": kind,
                "education_level": group.education_level,
            }),
        )
    })
}
