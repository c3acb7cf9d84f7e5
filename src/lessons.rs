//! Committed lessons.
//!
//! The store is the last line against double booking: every write re-checks
//! the (date, slot, teacher | group | room) uniqueness rules under the write
//! lock, so two racing writers cannot both land in the same cell.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;
use parking_lot::RwLock;
use serde_json::json;

use crate::busy::{Booking, BusyIndex, LessonSource};
use crate::data::{
    Candidate, GroupId, LessonId, ScheduledLesson, SubjectId, TeacherId, TimeSlotId, Violation,
};
use crate::error::StoreError;

/// Persistent home of committed lessons.
pub trait LessonStore: LessonSource + Send + Sync {
    /// Lessons with `from <= date <= to`, ordered by date, slot and id.
    fn list(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<ScheduledLesson>;

    fn get(&self, id: LessonId) -> Option<ScheduledLesson>;

    /// Persists every candidate or none of them.
    fn insert_all(&self, candidates: &[Candidate]) -> Result<Vec<ScheduledLesson>, StoreError>;

    fn insert(&self, candidate: &Candidate) -> Result<ScheduledLesson, StoreError> {
        let mut inserted = self.insert_all(std::slice::from_ref(candidate))?;
        Ok(inserted.remove(0))
    }

    fn delete(&self, id: LessonId) -> Result<ScheduledLesson, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct LessonTable {
    next_id: LessonId,
    lessons: BTreeMap<LessonId, ScheduledLesson>,
    busy: BusyIndex,
}

/// Lesson store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLessonStore {
    table: RwLock<LessonTable>,
}

impl InMemoryLessonStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clash(index: &BusyIndex, booking: &Booking) -> Option<Violation> {
    index.first_clash(booking).map(|(resource, holder)| {
        Violation::new(
            resource.busy_code(),
            json!({
                "lesson_id": holder.lesson_id,
                "date": booking.date,
                "time_slot_id": booking.time_slot_id,
            }),
        )
    })
}

impl LessonSource for InMemoryLessonStore {
    fn bookings_at(&self, date: NaiveDate, time_slot_id: TimeSlotId) -> Vec<Booking> {
        self.table.read().busy.bookings_at(date, time_slot_id)
    }

    fn teacher_bookings_between(
        &self,
        teacher_id: TeacherId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Vec<Booking> {
        self.table
            .read()
            .lessons
            .values()
            .filter(|l| l.teacher_id == teacher_id && l.date >= from && l.date < until)
            .map(Booking::from)
            .collect()
    }

    fn group_subject_bookings(&self, group_id: GroupId, subject_id: SubjectId) -> Vec<Booking> {
        self.table
            .read()
            .lessons
            .values()
            .filter(|l| l.group_id == group_id && l.subject_id == subject_id)
            .map(Booking::from)
            .collect()
    }
}

impl LessonStore for InMemoryLessonStore {
    fn list(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<ScheduledLesson> {
        let table = self.table.read();
        let mut lessons: Vec<ScheduledLesson> = table
            .lessons
            .values()
            .filter(|l| from.is_none_or(|f| l.date >= f) && to.is_none_or(|t| l.date <= t))
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.date, l.time_slot_id, l.id));
        lessons
    }

    fn get(&self, id: LessonId) -> Option<ScheduledLesson> {
        self.table.read().lessons.get(&id).cloned()
    }

    fn insert_all(&self, candidates: &[Candidate]) -> Result<Vec<ScheduledLesson>, StoreError> {
        let mut table = self.table.write();

        let mut staged = BusyIndex::new();
        for candidate in candidates {
            let booking = Booking::provisional(candidate);
            if let Some(violation) = clash(&table.busy, &booking).or_else(|| clash(&staged, &booking))
            {
                debug!("Rejecting batch of {} lessons: {}", candidates.len(), violation);
                return Err(StoreError::Duplicate(violation));
            }
            staged.insert(booking);
        }

        let mut inserted = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            table.next_id += 1;
            let lesson = ScheduledLesson::from_candidate(table.next_id, candidate);
            table.busy.insert(Booking::from(&lesson));
            table.lessons.insert(lesson.id, lesson.clone());
            inserted.push(lesson);
        }
        Ok(inserted)
    }

    fn delete(&self, id: LessonId) -> Result<ScheduledLesson, StoreError> {
        let mut table = self.table.write();
        let lesson = table
            .lessons
            .remove(&id)
            .ok_or(StoreError::LessonNotFound(id))?;
        table.busy.remove(id, lesson.date, lesson.time_slot_id);
        Ok(lesson)
    }

    fn len(&self) -> usize {
        self.table.read().lessons.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ViolationCode;
    use crate::test_support::{candidate, date};

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = InMemoryLessonStore::new();
        let mut second = candidate();
        second.time_slot_id = 2;

        let lessons = store.insert_all(&[candidate(), second]).unwrap();
        assert_eq!(lessons.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().time_slot_id, 2);
    }

    #[test]
    fn duplicate_teacher_cell_is_rejected() {
        let store = InMemoryLessonStore::new();
        store.insert_all(&[candidate()]).unwrap();

        let mut other = candidate();
        other.group_id = 2;
        other.room_id = Some(3);
        match store.insert_all(&[other]) {
            Err(StoreError::Duplicate(v)) => {
                assert_eq!(v.code, ViolationCode::TeacherBusy);
                assert_eq!(v.details["lesson_id"], 1);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryLessonStore::new();
        let mut free = candidate();
        free.time_slot_id = 3;
        let mut same_room = candidate();
        same_room.teacher_id = 2;
        same_room.group_id = 2;

        // the last two collide on room 1 within the batch
        let result = store.insert_all(&[free, candidate(), same_room]);
        match result {
            Err(StoreError::Duplicate(v)) => {
                assert_eq!(v.code, ViolationCode::RoomBusy);
                assert!(v.details["lesson_id"].is_null());
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn remote_lessons_do_not_hold_rooms() {
        let store = InMemoryLessonStore::new();
        let mut remote = candidate();
        remote.is_remote = true;
        store.insert_all(&[remote]).unwrap();

        let mut in_room = candidate();
        in_room.teacher_id = 2;
        in_room.group_id = 2;
        assert!(store.insert_all(&[in_room]).is_ok());
    }

    #[test]
    fn delete_frees_the_cell() {
        let store = InMemoryLessonStore::new();
        let lesson = store.insert_all(&[candidate()]).unwrap().remove(0);

        store.delete(lesson.id).unwrap();
        assert!(store.bookings_at(lesson.date, lesson.time_slot_id).is_empty());
        assert!(store.insert_all(&[candidate()]).is_ok());
        assert!(matches!(store.delete(lesson.id), Err(StoreError::LessonNotFound(_))));
    }

    #[test]
    fn list_filters_by_inclusive_range() {
        let store = InMemoryLessonStore::new();
        let mut tuesday = candidate();
        tuesday.date = date("2025-09-02");
        let mut friday = candidate();
        friday.date = date("2025-09-05");
        store.insert_all(&[friday, candidate(), tuesday]).unwrap();

        let dates: Vec<NaiveDate> = store
            .list(Some(date("2025-09-01")), Some(date("2025-09-02")))
            .iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(dates, vec![date("2025-09-01"), date("2025-09-02")]);
        assert_eq!(store.list(None, None).len(), 3);
    }

    #[test]
    fn queries_by_teacher_week_and_curriculum_pair() {
        let store = InMemoryLessonStore::new();
        let mut next_week = candidate();
        next_week.date = date("2025-09-08");
        store.insert_all(&[candidate(), next_week]).unwrap();

        let week = store.teacher_bookings_between(1, date("2025-09-01"), date("2025-09-08"));
        assert_eq!(week.len(), 1);
        assert_eq!(store.group_subject_bookings(1, 1).len(), 2);
        assert!(store.group_subject_bookings(1, 2).is_empty());
    }
}
