use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type GroupId = u32;
pub type TeacherId = u32;
pub type SubjectId = u32;
pub type BuildingId = u32;
pub type RoomTypeId = u32;
pub type RoomId = u32;
pub type TimeSlotId = u32;
pub type LessonTypeId = u32;
pub type LessonId = u64;

/// Education track a group studies in. Buildings are tagged with the same
/// marker and only host groups of their own track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EducationLevel {
    Vo,
    Spo,
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EducationLevel::Vo => write!(f, "VO"),
            EducationLevel::Spo => write!(f, "SPO"),
        }
    }
}

/// A class of students that attends lessons together.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub code: String,
    pub students_count: u32,
    pub education_level: EducationLevel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Building {
    pub id: BuildingId,
    #[serde(default)]
    pub name: String,
    /// Track marker; an untagged building accepts any group.
    #[serde(rename = "type", default)]
    pub kind: Option<EducationLevel>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub name: String,
    #[serde(default)]
    pub requires_computers: bool,
}

/// A room in a building; its type decides whether lessons there need computers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub building_id: BuildingId,
    #[serde(default)]
    pub number: String,
    pub capacity: u32,
    #[serde(default)]
    pub computers_count: u32,
    #[serde(default)]
    pub room_type_id: Option<RoomTypeId>,
}

/// A numbered period of the school day.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub order_no: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl TimeSlot {
    /// Length of the slot in hours, never negative.
    pub fn duration_hours(&self) -> f64 {
        let minutes = (self.end_time - self.start_time).num_minutes().max(0);
        minutes as f64 / 60.0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LessonType {
    pub id: LessonTypeId,
    pub name: String,
}

/// Total instructional hours a group is owed for one subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Curriculum {
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub total_hours: f64,
}

/// Weekly hour cap for a teacher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadLimit {
    pub teacher_id: TeacherId,
    pub hours_per_week: f64,
}

/// When a teacher can work on a given weekday (0 = Monday .. 6 = Sunday).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeacherAvailability {
    pub teacher_id: TeacherId,
    pub weekday: u8,
    #[serde(default)]
    pub available_from: Option<NaiveTime>,
    #[serde(default)]
    pub available_to: Option<NaiveTime>,
    #[serde(default)]
    pub is_day_off: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    #[serde(default)]
    pub name: String,
}

/// A lesson assignment that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Candidate {
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub lesson_type_id: Option<LessonTypeId>,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub requires_computers: bool,
}

impl Candidate {
    /// The room actually occupied by this lesson; remote lessons hold none.
    pub fn occupied_room(&self) -> Option<RoomId> {
        if self.is_remote { None } else { self.room_id }
    }
}

/// A committed lesson row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduledLesson {
    pub id: LessonId,
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub room_id: Option<RoomId>,
    pub is_remote: bool,
    pub lesson_type_id: Option<LessonTypeId>,
}

impl ScheduledLesson {
    pub fn from_candidate(id: LessonId, candidate: &Candidate) -> Self {
        Self {
            id,
            date: candidate.date,
            time_slot_id: candidate.time_slot_id,
            group_id: candidate.group_id,
            subject_id: candidate.subject_id,
            teacher_id: candidate.teacher_id,
            room_id: candidate.occupied_room(),
            is_remote: candidate.is_remote,
            lesson_type_id: candidate.lesson_type_id,
        }
    }
}

/// Machine-readable rule identifiers returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    BadRequest,
    TeacherBusy,
    GroupBusy,
    RoomBusy,
    TeacherLimitExceeded,
    TeacherNotAvailable,
    CurriculumHoursExceeded,
    RoomCapacityExceeded,
    RoomComputersNotEnough,
    InvalidBuilding,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::BadRequest => "BAD_REQUEST",
            ViolationCode::TeacherBusy => "TEACHER_BUSY",
            ViolationCode::GroupBusy => "GROUP_BUSY",
            ViolationCode::RoomBusy => "ROOM_BUSY",
            ViolationCode::TeacherLimitExceeded => "TEACHER_LIMIT_EXCEEDED",
            ViolationCode::TeacherNotAvailable => "TEACHER_NOT_AVAILABLE",
            ViolationCode::CurriculumHoursExceeded => "CURRICULUM_HOURS_EXCEEDED",
            ViolationCode::RoomCapacityExceeded => "ROOM_CAPACITY_EXCEEDED",
            ViolationCode::RoomComputersNotEnough => "ROOM_COMPUTERS_NOT_ENOUGH",
            ViolationCode::InvalidBuilding => "INVALID_BUILDING",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a scheduling rule the candidate breaks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub details: Value,
}

impl Violation {
    pub fn new(code: ViolationCode, details: Value) -> Self {
        Self { code, details }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.details)
    }
}

/// Result of validating one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub ok: bool,
    #[serde(rename = "errors")]
    pub violations: Vec<Violation>,
}

impl CheckOutcome {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            ok: violations.is_empty(),
            violations,
        }
    }

    pub fn codes(&self) -> Vec<ViolationCode> {
        self.violations.iter().map(|v| v.code).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnplacedContext {
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
}

/// A (group, subject) lesson the planner could not fit into a slot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Unplaced {
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub reason_codes: Vec<ViolationCode>,
    pub context: UnplacedContext,
}

/// The final output of a planner run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PlanningResult {
    pub proposed: Vec<Candidate>,
    pub unplaced: Vec<Unplaced>,
}

/// Weekday index used by availability rows: Monday is 0.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Monday of the week containing `date` and the Monday after it, or `None`
/// at the edges of the representable calendar.
pub fn week_bounds(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = date.checked_sub_days(chrono::Days::new(u64::from(weekday_index(date))))?;
    let end = start.checked_add_days(chrono::Days::new(7))?;
    Some((start, end))
}
