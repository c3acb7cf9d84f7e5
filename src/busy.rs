//! Occupancy lookups for conflict detection.
//!
//! [`BusyIndex`] groups bookings by (date, time slot) so a busy check only
//! touches the lessons of one cell. [`LayeredLessons`] stacks the provisional
//! bookings of a single planner run or commit on top of the committed ones.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::data::{
    Candidate, GroupId, LessonId, RoomId, ScheduledLesson, SubjectId, TeacherId, TimeSlotId,
    ViolationCode,
};

/// A lesson as seen by the conflict checks. Provisional bookings carry no id.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub lesson_id: Option<LessonId>,
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub room_id: Option<RoomId>,
}

impl Booking {
    pub fn provisional(candidate: &Candidate) -> Self {
        Self {
            lesson_id: None,
            date: candidate.date,
            time_slot_id: candidate.time_slot_id,
            group_id: candidate.group_id,
            subject_id: candidate.subject_id,
            teacher_id: candidate.teacher_id,
            room_id: candidate.occupied_room(),
        }
    }

    /// Resources this booking occupies for its cell.
    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        [
            Some(Resource::Teacher(self.teacher_id)),
            Some(Resource::Group(self.group_id)),
            self.room_id.map(Resource::Room),
        ]
        .into_iter()
        .flatten()
    }

    pub fn holds(&self, resource: Resource) -> bool {
        self.resources().any(|r| r == resource)
    }
}

impl From<&ScheduledLesson> for Booking {
    fn from(lesson: &ScheduledLesson) -> Self {
        Self {
            lesson_id: Some(lesson.id),
            date: lesson.date,
            time_slot_id: lesson.time_slot_id,
            group_id: lesson.group_id,
            subject_id: lesson.subject_id,
            teacher_id: lesson.teacher_id,
            room_id: lesson.room_id,
        }
    }
}

/// Something that can only be in one place per (date, time slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Teacher(TeacherId),
    Group(GroupId),
    Room(RoomId),
}

impl Resource {
    pub fn busy_code(&self) -> ViolationCode {
        match self {
            Resource::Teacher(_) => ViolationCode::TeacherBusy,
            Resource::Group(_) => ViolationCode::GroupBusy,
            Resource::Room(_) => ViolationCode::RoomBusy,
        }
    }
}

/// Read access to lessons that already hold resources.
pub trait LessonSource {
    /// Bookings in one (date, time slot) cell.
    fn bookings_at(&self, date: NaiveDate, time_slot_id: TimeSlotId) -> Vec<Booking>;

    /// Bookings of a teacher with `from <= date < until`.
    fn teacher_bookings_between(
        &self,
        teacher_id: TeacherId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<Booking>;

    /// Every booking of a (group, subject) pair, any date.
    fn group_subject_bookings(&self, group_id: GroupId, subject_id: SubjectId) -> Vec<Booking>;
}

/// Bookings keyed by (date, time slot).
#[derive(Debug, Clone, Default)]
pub struct BusyIndex {
    cells: HashMap<(NaiveDate, TimeSlotId), Vec<Booking>>,
}

impl BusyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, booking: Booking) {
        self.cells
            .entry((booking.date, booking.time_slot_id))
            .or_default()
            .push(booking);
    }

    /// Removes a persisted booking; returns it if it was present.
    pub fn remove(
        &mut self,
        lesson_id: LessonId,
        date: NaiveDate,
        time_slot_id: TimeSlotId,
    ) -> Option<Booking> {
        let key = (date, time_slot_id);
        let cell = self.cells.get_mut(&key)?;
        let pos = cell.iter().position(|b| b.lesson_id == Some(lesson_id))?;
        let removed = cell.remove(pos);
        if cell.is_empty() {
            self.cells.remove(&key);
        }
        Some(removed)
    }

    pub fn at(&self, date: NaiveDate, time_slot_id: TimeSlotId) -> &[Booking] {
        self.cells
            .get(&(date, time_slot_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The booking holding `resource` in the cell, if any.
    pub fn holder(
        &self,
        date: NaiveDate,
        time_slot_id: TimeSlotId,
        resource: Resource,
    ) -> Option<&Booking> {
        self.at(date, time_slot_id).iter().find(|b| b.holds(resource))
    }

    /// First resource of `booking` already taken in its cell.
    pub fn first_clash(&self, booking: &Booking) -> Option<(Resource, &Booking)> {
        booking.resources().find_map(|resource| {
            self.holder(booking.date, booking.time_slot_id, resource)
                .map(|holder| (resource, holder))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Booking> {
        self.cells.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl LessonSource for BusyIndex {
    fn bookings_at(&self, date: NaiveDate, time_slot_id: TimeSlotId) -> Vec<Booking> {
        self.at(date, time_slot_id).to_vec()
    }

    fn teacher_bookings_between(
        &self,
        teacher_id: TeacherId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<Booking> {
        self.iter()
            .filter(|b| b.teacher_id == teacher_id && b.date >= from && b.date < until)
            .cloned()
            .collect()
    }

    fn group_subject_bookings(&self, group_id: GroupId, subject_id: SubjectId) -> Vec<Booking> {
        self.iter()
            .filter(|b| b.group_id == group_id && b.subject_id == subject_id)
            .cloned()
            .collect()
    }
}

/// Committed lessons plus the provisional bookings of one run.
///
/// Lives for a single planner pass or commit and is never shared.
pub struct LayeredLessons<'a, S: LessonSource + ?Sized> {
    base: &'a S,
    provisional: BusyIndex,
}

impl<'a, S: LessonSource + ?Sized> LayeredLessons<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            provisional: BusyIndex::new(),
        }
    }

    pub fn push(&mut self, candidate: &Candidate) {
        self.provisional.insert(Booking::provisional(candidate));
    }
}

impl<S: LessonSource + ?Sized> LessonSource for LayeredLessons<'_, S> {
    fn bookings_at(&self, date: NaiveDate, time_slot_id: TimeSlotId) -> Vec<Booking> {
        let mut bookings = self.base.bookings_at(date, time_slot_id);
        bookings.extend_from_slice(self.provisional.at(date, time_slot_id));
        bookings
    }

    fn teacher_bookings_between(
        &self,
        teacher_id: TeacherId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<Booking> {
        let mut bookings = self.base.teacher_bookings_between(teacher_id, from, until);
        bookings.extend(
            self.provisional
                .teacher_bookings_between(teacher_id, from, until),
        );
        bookings
    }

    fn group_subject_bookings(&self, group_id: GroupId, subject_id: SubjectId) -> Vec<Booking> {
        let mut bookings = self.base.group_subject_bookings(group_id, subject_id);
        bookings.extend(self.provisional.group_subject_bookings(group_id, subject_id));
        bookings
    }
}
