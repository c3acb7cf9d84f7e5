//! Reference data the scheduler reads: groups, teachers, rooms, slots and
//! the planning rules attached to them.
//!
//! The core only ever reads through the [`Directory`] trait. Optional tables
//! (workload limits, holidays) simply come back empty when absent.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};

use crate::data::{
    Building, BuildingId, Curriculum, Group, GroupId, Holiday, LessonType, LessonTypeId, Room,
    RoomId, RoomType, RoomTypeId, Subject, SubjectId, Teacher, TeacherAvailability, TeacherId,
    TimeSlot, TimeSlotId, WorkloadLimit,
};
use crate::error::DirectoryError;

/// Read access to directory entities.
///
/// Listing methods return entities in a stable order: ascending id, except
/// [`Directory::time_slots`] which follows `order_no`.
pub trait Directory: Send + Sync {
    fn group(&self, id: GroupId) -> Option<Group>;
    fn groups(&self) -> Vec<Group>;
    fn teacher(&self, id: TeacherId) -> Option<Teacher>;
    fn teachers(&self) -> Vec<Teacher>;
    fn subject(&self, id: SubjectId) -> Option<Subject>;
    fn building(&self, id: BuildingId) -> Option<Building>;
    fn room_type(&self, id: RoomTypeId) -> Option<RoomType>;
    fn room(&self, id: RoomId) -> Option<Room>;
    fn rooms(&self) -> Vec<Room>;
    fn time_slot(&self, id: TimeSlotId) -> Option<TimeSlot>;
    fn time_slots(&self) -> Vec<TimeSlot>;
    fn lesson_type(&self, id: LessonTypeId) -> Option<LessonType>;
    /// Lesson type stamped on planner proposals (lowest id).
    fn default_lesson_type(&self) -> Option<LessonType>;
    fn curriculum(&self, group_id: GroupId, subject_id: SubjectId) -> Option<Curriculum>;
    /// Curriculum rows of one group, ascending subject id.
    fn curricula_for_group(&self, group_id: GroupId) -> Vec<Curriculum>;
    /// False when the directory carries no workload table at all.
    fn has_workload_limits(&self) -> bool;
    fn workload_limit(&self, teacher_id: TeacherId) -> Option<WorkloadLimit>;
    fn availability(&self, teacher_id: TeacherId, weekday: u8) -> Option<TeacherAvailability>;
    fn is_holiday(&self, date: NaiveDate) -> bool;

    /// Whether lessons in this room are computer lessons.
    fn room_requires_computers(&self, room: &Room) -> bool {
        room.room_type_id
            .and_then(|id| self.room_type(id))
            .is_some_and(|t| t.requires_computers)
    }
}

/// Serialized form of the whole directory, used for seed files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectorySnapshot {
    pub groups: Vec<Group>,
    pub teachers: Vec<Teacher>,
    pub subjects: Vec<Subject>,
    pub buildings: Vec<Building>,
    pub room_types: Vec<RoomType>,
    pub rooms: Vec<Room>,
    pub time_slots: Vec<TimeSlot>,
    pub lesson_types: Vec<LessonType>,
    pub curricula: Vec<Curriculum>,
    pub workload_limits: Vec<WorkloadLimit>,
    pub availability: Vec<TeacherAvailability>,
    pub holidays: Vec<Holiday>,
}

impl DirectorySnapshot {
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks uniqueness and referential rules the store relies on.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        reject_duplicates("group id", self.groups.iter().map(|g| g.id))?;
        reject_duplicates("group code", self.groups.iter().map(|g| g.code.as_str()))?;
        reject_duplicates("teacher id", self.teachers.iter().map(|t| t.id))?;
        reject_duplicates("subject id", self.subjects.iter().map(|s| s.id))?;
        reject_duplicates("building id", self.buildings.iter().map(|b| b.id))?;
        reject_duplicates("room type id", self.room_types.iter().map(|t| t.id))?;
        reject_duplicates("room id", self.rooms.iter().map(|r| r.id))?;
        reject_duplicates("time slot id", self.time_slots.iter().map(|s| s.id))?;
        reject_duplicates("time slot order_no", self.time_slots.iter().map(|s| s.order_no))?;
        reject_duplicates("lesson type id", self.lesson_types.iter().map(|t| t.id))?;
        reject_duplicates(
            "curriculum (group, subject)",
            self.curricula.iter().map(|c| (c.group_id, c.subject_id)),
        )?;
        reject_duplicates(
            "workload limit teacher",
            self.workload_limits.iter().map(|w| w.teacher_id),
        )?;
        reject_duplicates(
            "availability (teacher, weekday)",
            self.availability.iter().map(|a| (a.teacher_id, a.weekday)),
        )?;

        if let Some(slot) = self.time_slots.iter().find(|s| s.end_time <= s.start_time) {
            return Err(integrity(format!(
                "time slot {} ends at {} which is not after its start {}",
                slot.id, slot.end_time, slot.start_time
            )));
        }
        if let Some(row) = self.availability.iter().find(|a| a.weekday > 6) {
            return Err(integrity(format!(
                "availability of teacher {} uses weekday {} (expected 0..=6)",
                row.teacher_id, row.weekday
            )));
        }

        let buildings: HashSet<BuildingId> = self.buildings.iter().map(|b| b.id).collect();
        let room_types: HashSet<RoomTypeId> = self.room_types.iter().map(|t| t.id).collect();
        for room in &self.rooms {
            if !buildings.contains(&room.building_id) {
                return Err(integrity(format!(
                    "room {} references missing building {}",
                    room.id, room.building_id
                )));
            }
            if let Some(type_id) = room.room_type_id.filter(|id| !room_types.contains(id)) {
                return Err(integrity(format!(
                    "room {} references missing room type {}",
                    room.id, type_id
                )));
            }
        }
        Ok(())
    }
}

fn integrity(message: String) -> DirectoryError {
    DirectoryError::Integrity(message)
}

fn reject_duplicates<K, I>(what: &str, keys: I) -> Result<(), DirectoryError>
where
    I: Iterator<Item = K>,
    K: std::hash::Hash + Eq + std::fmt::Debug + Clone,
{
    match keys.duplicates().next() {
        Some(key) => Err(integrity(format!("duplicate {what}: {key:?}"))),
        None => Ok(()),
    }
}

/// Directory held entirely in memory, built from a validated snapshot.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    groups: BTreeMap<GroupId, Group>,
    teachers: BTreeMap<TeacherId, Teacher>,
    subjects: BTreeMap<SubjectId, Subject>,
    buildings: HashMap<BuildingId, Building>,
    room_types: HashMap<RoomTypeId, RoomType>,
    rooms: BTreeMap<RoomId, Room>,
    time_slots: HashMap<TimeSlotId, TimeSlot>,
    slot_order: Vec<TimeSlotId>,
    lesson_types: BTreeMap<LessonTypeId, LessonType>,
    curricula: BTreeMap<(GroupId, SubjectId), Curriculum>,
    workload_limits: HashMap<TeacherId, WorkloadLimit>,
    availability: HashMap<(TeacherId, u8), TeacherAvailability>,
    holidays: HashSet<NaiveDate>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Result<Self, DirectoryError> {
        snapshot.validate()?;

        let slot_order = snapshot
            .time_slots
            .iter()
            .sorted_by_key(|s| s.order_no)
            .map(|s| s.id)
            .collect();

        let directory = Self {
            groups: snapshot.groups.into_iter().map(|g| (g.id, g)).collect(),
            teachers: snapshot.teachers.into_iter().map(|t| (t.id, t)).collect(),
            subjects: snapshot.subjects.into_iter().map(|s| (s.id, s)).collect(),
            buildings: snapshot.buildings.into_iter().map(|b| (b.id, b)).collect(),
            room_types: snapshot.room_types.into_iter().map(|t| (t.id, t)).collect(),
            rooms: snapshot.rooms.into_iter().map(|r| (r.id, r)).collect(),
            time_slots: snapshot.time_slots.into_iter().map(|s| (s.id, s)).collect(),
            slot_order,
            lesson_types: snapshot.lesson_types.into_iter().map(|t| (t.id, t)).collect(),
            curricula: snapshot
                .curricula
                .into_iter()
                .map(|c| ((c.group_id, c.subject_id), c))
                .collect(),
            workload_limits: snapshot
                .workload_limits
                .into_iter()
                .map(|w| (w.teacher_id, w))
                .collect(),
            availability: snapshot
                .availability
                .into_iter()
                .map(|a| ((a.teacher_id, a.weekday), a))
                .collect(),
            holidays: snapshot.holidays.into_iter().map(|h| h.date).collect(),
        };

        info!(
            "Directory loaded: {} groups, {} teachers, {} rooms, {} time slots, {} curriculum rows",
            directory.groups.len(),
            directory.teachers.len(),
            directory.rooms.len(),
            directory.slot_order.len(),
            directory.curricula.len()
        );
        Ok(directory)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        Self::from_snapshot(DirectorySnapshot::from_path(path)?)
    }
}

impl Directory for InMemoryDirectory {
    fn group(&self, id: GroupId) -> Option<Group> {
        self.groups.get(&id).cloned()
    }

    fn groups(&self) -> Vec<Group> {
        self.groups.values().cloned().collect()
    }

    fn teacher(&self, id: TeacherId) -> Option<Teacher> {
        self.teachers.get(&id).cloned()
    }

    fn teachers(&self) -> Vec<Teacher> {
        self.teachers.values().cloned().collect()
    }

    fn subject(&self, id: SubjectId) -> Option<Subject> {
        self.subjects.get(&id).cloned()
    }

    fn building(&self, id: BuildingId) -> Option<Building> {
        self.buildings.get(&id).cloned()
    }

    fn room_type(&self, id: RoomTypeId) -> Option<RoomType> {
        self.room_types.get(&id).cloned()
    }

    fn room(&self, id: RoomId) -> Option<Room> {
        self.rooms.get(&id).cloned()
    }

    fn rooms(&self) -> Vec<Room> {
        self.rooms.values().cloned().collect()
    }

    fn time_slot(&self, id: TimeSlotId) -> Option<TimeSlot> {
        self.time_slots.get(&id).cloned()
    }

    fn time_slots(&self) -> Vec<TimeSlot> {
        self.slot_order
            .iter()
            .filter_map(|id| self.time_slots.get(id).cloned())
            .collect()
    }

    fn lesson_type(&self, id: LessonTypeId) -> Option<LessonType> {
        self.lesson_types.get(&id).cloned()
    }

    fn default_lesson_type(&self) -> Option<LessonType> {
        self.lesson_types.values().next().cloned()
    }

    fn curriculum(&self, group_id: GroupId, subject_id: SubjectId) -> Option<Curriculum> {
        self.curricula.get(&(group_id, subject_id)).cloned()
    }

    fn curricula_for_group(&self, group_id: GroupId) -> Vec<Curriculum> {
        self.curricula
            .range((group_id, SubjectId::MIN)..=(group_id, SubjectId::MAX))
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn has_workload_limits(&self) -> bool {
        !self.workload_limits.is_empty()
    }

    fn workload_limit(&self, teacher_id: TeacherId) -> Option<WorkloadLimit> {
        self.workload_limits.get(&teacher_id).cloned()
    }

    fn availability(&self, teacher_id: TeacherId, weekday: u8) -> Option<TeacherAvailability> {
        self.availability.get(&(teacher_id, weekday)).cloned()
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}
