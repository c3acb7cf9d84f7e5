//! Shared fixtures for unit tests.

use chrono::{NaiveDate, NaiveTime};

use crate::data::{
    Building, Candidate, Curriculum, EducationLevel, Group, LessonType, Room, RoomType, Subject,
    Teacher, TeacherAvailability, TimeSlot, WorkloadLimit,
};
use crate::directory::{DirectorySnapshot, InMemoryDirectory};

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Two SPO groups, two teachers available Mon-Fri 08:00-18:00, three
/// 1.5 hour slots, a classroom and a computer lab in the SPO building and
/// a large VO lecture hall.
pub fn sample_snapshot() -> DirectorySnapshot {
    DirectorySnapshot {
        groups: vec![
            Group {
                id: 1,
                code: "IT-101".into(),
                students_count: 28,
                education_level: EducationLevel::Spo,
            },
            Group {
                id: 2,
                code: "PE-201".into(),
                students_count: 24,
                education_level: EducationLevel::Spo,
            },
        ],
        teachers: vec![
            Teacher {
                id: 1,
                full_name: "Ivanov I.I.".into(),
            },
            Teacher {
                id: 2,
                full_name: "Petrov P.P.".into(),
            },
        ],
        subjects: vec![
            Subject {
                id: 1,
                name: "Mathematics".into(),
            },
            Subject {
                id: 2,
                name: "Programming".into(),
            },
        ],
        buildings: vec![
            Building {
                id: 1,
                name: "SPO campus".into(),
                kind: Some(EducationLevel::Spo),
            },
            Building {
                id: 2,
                name: "VO campus".into(),
                kind: Some(EducationLevel::Vo),
            },
        ],
        room_types: vec![
            RoomType {
                id: 1,
                name: "Classroom".into(),
                requires_computers: false,
            },
            RoomType {
                id: 2,
                name: "Computer lab".into(),
                requires_computers: true,
            },
        ],
        rooms: vec![
            Room {
                id: 1,
                building_id: 1,
                number: "101".into(),
                capacity: 30,
                computers_count: 0,
                room_type_id: Some(1),
            },
            Room {
                id: 2,
                building_id: 1,
                number: "102".into(),
                capacity: 30,
                computers_count: 25,
                room_type_id: Some(2),
            },
            Room {
                id: 3,
                building_id: 2,
                number: "201".into(),
                capacity: 50,
                computers_count: 0,
                room_type_id: Some(1),
            },
        ],
        time_slots: vec![
            TimeSlot {
                id: 1,
                order_no: 1,
                start_time: time(8, 30),
                end_time: time(10, 0),
            },
            TimeSlot {
                id: 2,
                order_no: 2,
                start_time: time(10, 10),
                end_time: time(11, 40),
            },
            TimeSlot {
                id: 3,
                order_no: 3,
                start_time: time(12, 20),
                end_time: time(13, 50),
            },
        ],
        lesson_types: vec![
            LessonType {
                id: 1,
                name: "Lecture".into(),
            },
            LessonType {
                id: 2,
                name: "Practice".into(),
            },
        ],
        curricula: vec![
            Curriculum {
                group_id: 1,
                subject_id: 1,
                total_hours: 30.0,
            },
            Curriculum {
                group_id: 1,
                subject_id: 2,
                total_hours: 30.0,
            },
        ],
        workload_limits: vec![WorkloadLimit {
            teacher_id: 1,
            hours_per_week: 18.0,
        }],
        availability: (1..=2)
            .flat_map(|teacher_id| {
                (0..5).map(move |weekday| TeacherAvailability {
                    teacher_id,
                    weekday,
                    available_from: Some(time(8, 0)),
                    available_to: Some(time(18, 0)),
                    is_day_off: false,
                })
            })
            .collect(),
        holidays: vec![],
    }
}

pub fn sample_directory() -> InMemoryDirectory {
    InMemoryDirectory::from_snapshot(sample_snapshot()).unwrap()
}

/// Group 1, Mathematics, teacher 1, room 101, first slot on Monday 2025-09-01.
pub fn candidate() -> Candidate {
    Candidate {
        date: date("2025-09-01"),
        time_slot_id: 1,
        group_id: 1,
        subject_id: 1,
        teacher_id: 1,
        room_id: Some(1),
        lesson_type_id: None,
        is_remote: false,
        requires_computers: false,
    }
}
