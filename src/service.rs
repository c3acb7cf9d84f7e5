//! Operations exposed to callers: checks, manual lesson edits, planning
//! runs and commits, tied to the stores they read and write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta, Utc};
use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::busy::LayeredLessons;
use crate::constraints::{ConstraintChecker, parse_candidate};
use crate::data::{CheckOutcome, LessonId, PlanningResult, ScheduledLesson};
use crate::directory::Directory;
use crate::error::{CoreError, CoreResult};
use crate::lessons::LessonStore;
use crate::planner::{GreedyPlanner, PlanRequest, PlanningInput};
use crate::preview::{PlanningPreview, PreviewStore};

/// A stored planner run as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPreview {
    pub preview_id: String,
    #[serde(flatten)]
    pub result: PlanningResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitOutcome {
    pub committed: usize,
    pub lesson_ids: Vec<LessonId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub groups: usize,
    pub teachers: usize,
    pub rooms: usize,
    pub time_slots: usize,
    pub lessons: usize,
}

pub struct TimetableService {
    directory: Arc<dyn Directory>,
    lessons: Arc<dyn LessonStore>,
    previews: Arc<dyn PreviewStore>,
    planner: GreedyPlanner,
    preview_ttl: Option<TimeDelta>,
    // check-then-write must not interleave with another writer
    write_lock: Mutex<()>,
}

impl TimetableService {
    pub fn new(
        directory: Arc<dyn Directory>,
        lessons: Arc<dyn LessonStore>,
        previews: Arc<dyn PreviewStore>,
    ) -> Self {
        Self {
            directory,
            lessons,
            previews,
            planner: GreedyPlanner::new(),
            preview_ttl: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Previews older than `ttl` read as missing and are dropped.
    pub fn with_preview_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.preview_ttl = ttl.and_then(|ttl| TimeDelta::from_std(ttl).ok());
        self
    }

    fn checker(&self) -> ConstraintChecker<'_, dyn Directory, dyn LessonStore> {
        ConstraintChecker::new(self.directory.as_ref(), self.lessons.as_ref())
    }

    /// Validates a raw candidate against committed lessons.
    pub fn check(&self, payload: &Value) -> CoreResult<CheckOutcome> {
        self.checker().check_json(payload)
    }

    /// Validates and persists one lesson entered by hand.
    pub fn create_lesson(&self, payload: &Value) -> CoreResult<ScheduledLesson> {
        let candidate =
            parse_candidate(payload).map_err(|violation| CoreError::BadRequest(violation.details))?;
        if let Some(type_id) = candidate.lesson_type_id {
            self.directory
                .lesson_type(type_id)
                .ok_or_else(|| CoreError::not_found("lesson type", type_id))?;
        }

        let _guard = self.write_lock.lock();
        let outcome = self.checker().check(&candidate)?;
        if !outcome.ok {
            debug!("Lesson refused: {:?}", outcome.codes());
            return Err(CoreError::Conflict(outcome.violations));
        }
        let lesson = self.lessons.insert(&candidate)?;
        info!(
            "Lesson {} created for group {} on {} slot {}",
            lesson.id, lesson.group_id, lesson.date, lesson.time_slot_id
        );
        Ok(lesson)
    }

    pub fn list_lessons(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Vec<ScheduledLesson> {
        self.lessons.list(from, to)
    }

    pub fn lesson(&self, id: LessonId) -> CoreResult<ScheduledLesson> {
        self.lessons
            .get(id)
            .ok_or_else(|| CoreError::not_found("lesson", id))
    }

    pub fn delete_lesson(&self, id: LessonId) -> CoreResult<ScheduledLesson> {
        let _guard = self.write_lock.lock();
        let lesson = self.lessons.delete(id)?;
        info!("Lesson {} deleted", id);
        Ok(lesson)
    }

    fn planning_input(&self, request: &PlanRequest) -> CoreResult<PlanningInput> {
        let groups = match request.group_ids.as_deref() {
            None | Some([]) => self.directory.groups(),
            Some(ids) => ids
                .iter()
                .copied()
                .sorted()
                .dedup()
                .map(|id| {
                    self.directory
                        .group(id)
                        .ok_or_else(|| CoreError::not_found("group", id))
                })
                .collect::<CoreResult<_>>()?,
        };
        let teachers = match request.teacher_ids.as_deref() {
            None | Some([]) => self.directory.teachers(),
            Some(ids) => ids
                .iter()
                .copied()
                .sorted()
                .dedup()
                .map(|id| {
                    self.directory
                        .teacher(id)
                        .ok_or_else(|| CoreError::not_found("teacher", id))
                })
                .collect::<CoreResult<_>>()?,
        };

        Ok(PlanningInput {
            date_from: request.date_from,
            date_to: request.date_to,
            groups,
            teachers,
            honor_holidays: request.honor_holidays,
        })
    }

    /// Runs the planner and stores its output as a preview.
    pub fn generate(&self, request: &PlanRequest) -> CoreResult<GeneratedPreview> {
        let input = self.planning_input(request)?;
        let result = self
            .planner
            .generate(self.directory.as_ref(), self.lessons.as_ref(), &input)?;
        let preview_id = self.previews.save(result.clone());
        info!(
            "Preview {} stored: {} proposed, {} unplaced",
            preview_id,
            result.proposed.len(),
            result.unplaced.len()
        );
        Ok(GeneratedPreview { preview_id, result })
    }

    fn purge_expired_previews(&self) {
        if let Some(ttl) = self.preview_ttl {
            let purged = self.previews.purge_created_before(Utc::now() - ttl);
            if purged > 0 {
                debug!("Purged {} expired preview(s)", purged);
            }
        }
    }

    pub fn preview(&self, id: &str) -> CoreResult<PlanningPreview> {
        self.purge_expired_previews();
        self.previews
            .get(id)
            .ok_or_else(|| CoreError::not_found("preview", id))
    }

    /// Re-validates every proposal of a preview and persists all of them,
    /// or none if any proposal fails now. A successful commit consumes the
    /// preview.
    pub fn commit(&self, id: &str) -> CoreResult<CommitOutcome> {
        let preview = self.preview(id)?;
        let proposed = &preview.payload.proposed;

        let _guard = self.write_lock.lock();
        let mut layered = LayeredLessons::new(self.lessons.as_ref());
        let mut violations = Vec::new();
        for candidate in proposed {
            let outcome =
                ConstraintChecker::new(self.directory.as_ref(), &layered).check(candidate)?;
            if outcome.ok {
                layered.push(candidate);
            } else {
                violations.extend(outcome.violations);
            }
        }
        if !violations.is_empty() {
            warn!(
                "Commit of preview {} rejected: {} violation(s) among {} proposals",
                id,
                violations.len(),
                proposed.len()
            );
            return Err(CoreError::Conflict(violations));
        }

        let lessons = self.lessons.insert_all(proposed)?;
        self.previews.delete(id);
        info!("Preview {} committed: {} lessons", id, lessons.len());
        Ok(CommitOutcome {
            committed: lessons.len(),
            lesson_ids: lessons.iter().map(|l| l.id).collect(),
        })
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            groups: self.directory.groups().len(),
            teachers: self.directory.teachers().len(),
            rooms: self.directory.rooms().len(),
            time_slots: self.directory.time_slots().len(),
            lessons: self.lessons.len(),
        }
    }
}
