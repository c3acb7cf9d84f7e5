//! Greedy automatic timetable generation.
//!
//! One deterministic pass over dates, slots (by `order_no`) and groups.
//! Each candidate goes through the same [`ConstraintChecker`] used for manual
//! edits, on a view that also contains everything this run already placed.
//! Earlier placements are never revisited.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Datelike, NaiveDate, Weekday};
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::busy::{LayeredLessons, LessonSource};
use crate::constraints::ConstraintChecker;
use crate::data::{
    Candidate, Group, GroupId, LessonTypeId, PlanningResult, Room, SubjectId, Teacher, TeacherId,
    TimeSlot, Unplaced, UnplacedContext, ViolationCode,
};
use crate::directory::Directory;
use crate::error::CoreResult;

/// Planner request as received from a caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanRequest {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub honor_holidays: bool,
    /// Empty or absent means every group.
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
    /// Empty or absent means every teacher.
    #[serde(default)]
    pub teacher_ids: Option<Vec<TeacherId>>,
}

/// Resolved input of a run. Groups and teachers are tried in the given order.
#[derive(Debug, Clone)]
pub struct PlanningInput {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub groups: Vec<Group>,
    pub teachers: Vec<Teacher>,
    pub honor_holidays: bool,
}

/// A way of turning a planning input into proposals.
pub trait PlanningStrategy {
    fn propose<D, L>(
        &self,
        directory: &D,
        lessons: &L,
        input: &PlanningInput,
    ) -> CoreResult<PlanningResult>
    where
        D: Directory + ?Sized,
        L: LessonSource + ?Sized;
}

/// First-fit placement: for every (date, slot, group) take the first subject
/// with hours left and the first (teacher, room) pair that passes all checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStrategy;

fn is_day_off<D: Directory + ?Sized>(directory: &D, date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || directory.is_holiday(date)
}

/// Everything fixed for the duration of one cell search.
struct Cell<'a> {
    date: NaiveDate,
    slot: &'a TimeSlot,
    group: &'a Group,
    subject_id: SubjectId,
    lesson_type_id: Option<LessonTypeId>,
}

impl GreedyStrategy {
    /// Tries teachers then rooms in order. On failure returns every
    /// violation code seen along the way.
    fn place<D, L>(
        &self,
        checker: &ConstraintChecker<'_, D, L>,
        directory: &D,
        cell: &Cell<'_>,
        teachers: &[Teacher],
        rooms: &[Room],
        evaluations: &mut usize,
    ) -> CoreResult<Result<Candidate, Vec<ViolationCode>>>
    where
        D: Directory + ?Sized,
        L: LessonSource + ?Sized,
    {
        let mut reasons = Vec::new();
        for teacher in teachers {
            for room in rooms {
                let candidate = Candidate {
                    date: cell.date,
                    time_slot_id: cell.slot.id,
                    group_id: cell.group.id,
                    subject_id: cell.subject_id,
                    teacher_id: teacher.id,
                    room_id: Some(room.id),
                    lesson_type_id: cell.lesson_type_id,
                    is_remote: false,
                    requires_computers: directory.room_requires_computers(room),
                };
                *evaluations += 1;
                let outcome = checker.check(&candidate)?;
                if outcome.ok {
                    return Ok(Ok(candidate));
                }
                trace!(
                    "Rejected teacher {} / room {} for group {}: {:?}",
                    teacher.id,
                    room.id,
                    cell.group.id,
                    outcome.codes()
                );
                reasons.extend(outcome.codes());
            }
        }
        Ok(Err(reasons))
    }
}

impl PlanningStrategy for GreedyStrategy {
    fn propose<D, L>(
        &self,
        directory: &D,
        lessons: &L,
        input: &PlanningInput,
    ) -> CoreResult<PlanningResult>
    where
        D: Directory + ?Sized,
        L: LessonSource + ?Sized,
    {
        let start_time = Instant::now();
        let (date_from, date_to) = if input.date_to < input.date_from {
            (input.date_to, input.date_from)
        } else {
            (input.date_from, input.date_to)
        };
        let slots = directory.time_slots();
        let rooms = directory.rooms();
        let lesson_type_id = directory.default_lesson_type().map(|t| t.id);

        // hours still owed per (group, subject), net of committed lessons
        let mut remaining: BTreeMap<(GroupId, SubjectId), f64> = BTreeMap::new();
        for group in &input.groups {
            for plan in directory.curricula_for_group(group.id) {
                let used: f64 = lessons
                    .group_subject_bookings(group.id, plan.subject_id)
                    .iter()
                    .filter_map(|b| directory.time_slot(b.time_slot_id))
                    .map(|s| s.duration_hours())
                    .sum();
                remaining.insert((group.id, plan.subject_id), (plan.total_hours - used).max(0.0));
            }
        }

        info!(
            "Planning {}..={}: {} groups, {} teachers, {} rooms, {} slots per day, {} curriculum rows",
            date_from,
            date_to,
            input.groups.len(),
            input.teachers.len(),
            rooms.len(),
            slots.len(),
            remaining.len()
        );

        let mut layered = LayeredLessons::new(lessons);
        let mut result = PlanningResult::default();
        let mut evaluations = 0usize;

        for date in date_from.iter_days().take_while(|d| *d <= date_to) {
            if input.honor_holidays && is_day_off(directory, date) {
                debug!("Skipping {date}: weekend or holiday");
                continue;
            }
            for slot in &slots {
                for group in &input.groups {
                    let subjects: Vec<SubjectId> = remaining
                        .range((group.id, SubjectId::MIN)..=(group.id, SubjectId::MAX))
                        .filter(|(_, hours)| **hours > 0.0)
                        .map(|((_, subject_id), _)| *subject_id)
                        .collect();

                    for subject_id in subjects {
                        let cell = Cell {
                            date,
                            slot,
                            group,
                            subject_id,
                            lesson_type_id,
                        };
                        let placement = {
                            let checker = ConstraintChecker::new(directory, &layered);
                            self.place(
                                &checker,
                                directory,
                                &cell,
                                &input.teachers,
                                &rooms,
                                &mut evaluations,
                            )?
                        };

                        match placement {
                            Ok(candidate) => {
                                layered.push(&candidate);
                                if let Some(hours) = remaining.get_mut(&(group.id, subject_id)) {
                                    *hours = (*hours - slot.duration_hours()).max(0.0);
                                }
                                result.proposed.push(candidate);
                                break;
                            }
                            Err(reasons) if !reasons.is_empty() => {
                                result.unplaced.push(Unplaced {
                                    group_id: group.id,
                                    subject_id,
                                    reason_codes: reasons
                                        .into_iter()
                                        .sorted_by_key(|code| code.as_str())
                                        .dedup()
                                        .collect(),
                                    context: UnplacedContext {
                                        date,
                                        time_slot_id: slot.id,
                                    },
                                });
                            }
                            Err(_) => {}
                        }
                    }
                }
            }
        }

        info!(
            "Planner placed {} lessons, {} unplaced entries after {} checks in {:.2?}",
            result.proposed.len(),
            result.unplaced.len(),
            evaluations,
            start_time.elapsed()
        );
        Ok(result)
    }
}

/// Entry point for automatic planning.
#[derive(Debug, Clone, Default)]
pub struct GreedyPlanner<S = GreedyStrategy> {
    strategy: S,
}

impl GreedyPlanner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: PlanningStrategy> GreedyPlanner<S> {
    pub fn with_strategy(strategy: S) -> Self {
        Self { strategy }
    }

    /// Runs the strategy; with no groups or no teachers nothing is proposed.
    pub fn generate<D, L>(
        &self,
        directory: &D,
        lessons: &L,
        input: &PlanningInput,
    ) -> CoreResult<PlanningResult>
    where
        D: Directory + ?Sized,
        L: LessonSource + ?Sized,
    {
        if input.groups.is_empty() || input.teachers.is_empty() {
            info!("Nothing to plan: no groups or no teachers selected");
            return Ok(PlanningResult::default());
        }
        self.strategy.propose(directory, lessons, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busy::BusyIndex;
    use crate::data::{Curriculum, EducationLevel, Holiday, ScheduledLesson, WorkloadLimit};
    use crate::directory::{DirectorySnapshot, InMemoryDirectory};
    use crate::lessons::{InMemoryLessonStore, LessonStore};
    use crate::test_support::{candidate, date, sample_snapshot};

    fn input(directory: &InMemoryDirectory, from: &str, to: &str, groups: &[GroupId]) -> PlanningInput {
        PlanningInput {
            date_from: date(from),
            date_to: date(to),
            groups: groups.iter().filter_map(|id| directory.group(*id)).collect(),
            teachers: directory.teachers(),
            honor_holidays: false,
        }
    }

    fn run(snapshot: DirectorySnapshot, input_of: impl Fn(&InMemoryDirectory) -> PlanningInput) -> PlanningResult {
        let directory = InMemoryDirectory::from_snapshot(snapshot).unwrap();
        GreedyPlanner::new()
            .generate(&directory, &BusyIndex::new(), &input_of(&directory))
            .unwrap()
    }

    #[test]
    fn fills_every_slot_of_a_free_day() {
        let result = run(sample_snapshot(), |d| input(d, "2025-09-01", "2025-09-01", &[1]));

        assert!(result.unplaced.is_empty());
        assert_eq!(result.proposed.len(), 3);
        for (slot_id, proposal) in (1..=3).zip(&result.proposed) {
            assert_eq!(proposal.time_slot_id, slot_id);
            assert_eq!(proposal.subject_id, 1);
            assert_eq!(proposal.teacher_id, 1);
            assert_eq!(proposal.room_id, Some(1));
            assert_eq!(proposal.lesson_type_id, Some(1));
            assert!(!proposal.is_remote);
        }
    }

    #[test]
    fn group_without_remaining_hours_is_silently_skipped() {
        let result = run(sample_snapshot(), |d| input(d, "2025-09-01", "2025-09-01", &[2]));
        assert_eq!(result, PlanningResult::default());
    }

    #[test]
    fn unplaceable_subjects_collect_sorted_reasons() {
        // nobody works on Saturday; the lab is too small and room 201 is in the wrong building
        let result = run(sample_snapshot(), |d| input(d, "2025-09-06", "2025-09-06", &[1]));

        assert!(result.proposed.is_empty());
        // both subjects are tried in every slot
        assert_eq!(result.unplaced.len(), 6);
        let first = &result.unplaced[0];
        assert_eq!((first.group_id, first.subject_id), (1, 1));
        assert_eq!(first.context.date, date("2025-09-06"));
        assert_eq!(first.context.time_slot_id, 1);
        assert_eq!(
            first.reason_codes,
            vec![
                ViolationCode::InvalidBuilding,
                ViolationCode::RoomComputersNotEnough,
                ViolationCode::TeacherNotAvailable,
            ]
        );
        assert_eq!(result.unplaced[1].subject_id, 2);
    }

    #[test]
    fn holidays_and_weekends_are_skipped_when_honored() {
        let mut snapshot = sample_snapshot();
        snapshot.holidays.push(Holiday {
            date: date("2025-09-08"),
            name: "Founders day".into(),
        });
        let result = run(snapshot, |d| PlanningInput {
            honor_holidays: true,
            ..input(d, "2025-09-05", "2025-09-08", &[1])
        });

        assert!(result.unplaced.is_empty());
        assert_eq!(result.proposed.len(), 3);
        assert!(result.proposed.iter().all(|p| p.date == date("2025-09-05")));
    }

    #[test]
    fn weekends_count_when_holidays_are_not_honored() {
        let result = run(sample_snapshot(), |d| input(d, "2025-09-05", "2025-09-06", &[1]));
        assert_eq!(result.proposed.len(), 3);
        assert!(result.unplaced.iter().all(|u| u.context.date == date("2025-09-06")));
        assert!(!result.unplaced.is_empty());
    }

    #[test]
    fn teacher_is_not_double_booked_within_a_run() {
        let mut snapshot = sample_snapshot();
        snapshot.groups.push(Group {
            id: 3,
            code: "IT-102".into(),
            students_count: 20,
            education_level: EducationLevel::Spo,
        });
        snapshot.curricula.push(Curriculum {
            group_id: 3,
            subject_id: 1,
            total_hours: 30.0,
        });
        let result = run(snapshot, |d| PlanningInput {
            teachers: vec![d.teacher(1).unwrap()],
            ..input(d, "2025-09-01", "2025-09-01", &[1, 3])
        });

        assert!(result.proposed.iter().all(|p| p.group_id == 1));
        assert_eq!(result.unplaced.len(), 3);
        let reasons = &result.unplaced[0].reason_codes;
        assert_eq!(result.unplaced[0].group_id, 3);
        assert!(reasons.contains(&ViolationCode::TeacherBusy));
        assert!(reasons.contains(&ViolationCode::RoomBusy));
    }

    #[test]
    fn second_group_gets_the_other_teacher_and_room() {
        let mut snapshot = sample_snapshot();
        snapshot.curricula.push(Curriculum {
            group_id: 2,
            subject_id: 2,
            total_hours: 1.5,
        });
        let result = run(snapshot, |d| input(d, "2025-09-01", "2025-09-01", &[1, 2]));

        let group_two: Vec<&Candidate> =
            result.proposed.iter().filter(|p| p.group_id == 2).collect();
        assert_eq!(group_two.len(), 1);
        assert_eq!(group_two[0].teacher_id, 2);
        assert_eq!(group_two[0].room_id, Some(2));
        assert!(group_two[0].requires_computers);
        // its 1.5 hours are used up after the first slot
        assert!(result.unplaced.is_empty());
    }

    #[test]
    fn exhausted_curriculum_stops_placement() {
        let mut snapshot = sample_snapshot();
        snapshot.curricula.retain(|c| c.subject_id == 1);
        snapshot.curricula[0].total_hours = 3.0;
        let result = run(snapshot, |d| input(d, "2025-09-01", "2025-09-02", &[1]));

        assert_eq!(result.proposed.len(), 2);
        assert!(result.unplaced.is_empty());
    }

    #[test]
    fn partial_hours_left_are_reported_as_curriculum_overrun() {
        let mut snapshot = sample_snapshot();
        snapshot.curricula.retain(|c| c.subject_id == 1);
        snapshot.curricula[0].total_hours = 2.0;
        let result = run(snapshot, |d| input(d, "2025-09-01", "2025-09-01", &[1]));

        assert_eq!(result.proposed.len(), 1);
        assert_eq!(result.unplaced.len(), 2);
        assert!(
            result
                .unplaced
                .iter()
                .all(|u| u.reason_codes.contains(&ViolationCode::CurriculumHoursExceeded))
        );
    }

    #[test]
    fn weekly_limit_accounts_for_this_run() {
        let mut snapshot = sample_snapshot();
        snapshot.workload_limits = vec![WorkloadLimit {
            teacher_id: 1,
            hours_per_week: 3.0,
        }];
        let result = run(snapshot, |d| PlanningInput {
            teachers: vec![d.teacher(1).unwrap()],
            ..input(d, "2025-09-01", "2025-09-01", &[1])
        });

        assert_eq!(result.proposed.len(), 2);
        assert!(
            result
                .unplaced
                .iter()
                .all(|u| u.reason_codes.contains(&ViolationCode::TeacherLimitExceeded))
        );
    }

    #[test]
    fn committed_lessons_are_respected() {
        let directory = InMemoryDirectory::from_snapshot(sample_snapshot()).unwrap();
        let store = InMemoryLessonStore::new();
        let mut elsewhere = candidate();
        elsewhere.group_id = 2;
        elsewhere.room_id = Some(2);
        store.insert_all(&[elsewhere]).unwrap();

        let result = GreedyPlanner::new()
            .generate(&directory, &store, &input(&directory, "2025-09-01", "2025-09-01", &[1]))
            .unwrap();
        assert_eq!(result.proposed[0].teacher_id, 2);
        assert_eq!(result.proposed[1].teacher_id, 1);
    }

    #[test]
    fn committed_hours_reduce_the_budget() {
        let mut snapshot = sample_snapshot();
        snapshot.curricula.retain(|c| c.subject_id == 1);
        snapshot.curricula[0].total_hours = 3.0;
        let directory = InMemoryDirectory::from_snapshot(snapshot).unwrap();
        let mut index = BusyIndex::new();
        let mut earlier = candidate();
        earlier.date = date("2025-08-25");
        index.insert((&ScheduledLesson::from_candidate(1, &earlier)).into());

        let result = GreedyPlanner::new()
            .generate(&directory, &index, &input(&directory, "2025-09-01", "2025-09-01", &[1]))
            .unwrap();
        assert_eq!(result.proposed.len(), 1);
        assert!(result.unplaced.is_empty());
    }

    #[test]
    fn reversed_range_is_normalised() {
        let forward = run(sample_snapshot(), |d| input(d, "2025-09-01", "2025-09-03", &[1]));
        let backward = run(sample_snapshot(), |d| input(d, "2025-09-03", "2025-09-01", &[1]));
        assert_eq!(forward, backward);
        assert_eq!(forward.proposed.len(), 9);
    }

    #[test]
    fn runs_are_deterministic() {
        let mut snapshot = sample_snapshot();
        snapshot.curricula.push(Curriculum {
            group_id: 2,
            subject_id: 2,
            total_hours: 6.0,
        });
        let a = run(snapshot.clone(), |d| input(d, "2025-09-01", "2025-09-07", &[1, 2]));
        let b = run(snapshot, |d| input(d, "2025-09-01", "2025-09-07", &[1, 2]));
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_strategy_matches_default_planner() {
        let directory = InMemoryDirectory::from_snapshot(sample_snapshot()).unwrap();
        let input = input(&directory, "2025-09-01", "2025-09-02", &[1]);
        let explicit = GreedyPlanner::with_strategy(GreedyStrategy)
            .generate(&directory, &BusyIndex::new(), &input)
            .unwrap();
        let default = GreedyPlanner::new()
            .generate(&directory, &BusyIndex::new(), &input)
            .unwrap();
        assert_eq!(explicit, default);
    }

    #[test]
    fn no_teachers_means_empty_result() {
        let result = run(sample_snapshot(), |d| PlanningInput {
            teachers: vec![],
            ..input(d, "2025-09-01", "2025-09-05", &[1])
        });
        assert_eq!(result, PlanningResult::default());
    }
}
