use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde_json::Value;

use crate::{
    master::{LookupError, MasterData, Record},
    week::parse_wire_datetime,
};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// The element reference types attached to periods, also used to address
/// timetable queries (`id` + `type`).
///
/// Tags the server may add later land in `Unknown` instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Class,
    Teacher,
    Subject,
    Room,
    Student,
    Unknown(String),
}

impl ElementType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "CLASS" => Self::Class,
            "TEACHER" => Self::Teacher,
            "SUBJECT" => Self::Subject,
            "ROOM" => Self::Room,
            "STUDENT" => Self::Student,
            _ => Self::Unknown(tag.to_owned()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Class => "CLASS",
            Self::Teacher => "TEACHER",
            Self::Subject => "SUBJECT",
            Self::Room => "ROOM",
            Self::Student => "STUDENT",
            Self::Unknown(tag) => tag,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// One timetable period with its element references resolved against the
/// master data snapshot.
///
/// The resolved record lists are copies; later snapshot refreshes do not
/// propagate into existing lessons. An empty list means the referenced id
/// had no match.
#[derive(Debug, Clone, Default)]
pub struct Lesson {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub homeworks: Vec<Value>,
    pub exams: Vec<Value>,
    pub text: Option<Value>,
    pub can: Option<Value>,
    pub ist: Option<Value>,
    pub klassen: Vec<Record>,
    pub teachers: Vec<Record>,
    pub subjects: Vec<Record>,
    pub rooms: Vec<Record>,
}

impl Lesson {
    /// Resolves one raw period record.
    ///
    /// Every entry of the period's `elements` list contributes: a period can
    /// legitimately reference two teachers or a split room, so resolution
    /// does not stop at the first match. Elements with unrecognized tags are
    /// skipped.
    pub fn resolve(raw: &Value, master: &MasterData) -> Result<Self, LookupError> {
        let mut lesson = Self {
            start: raw
                .get("startDateTime")
                .and_then(Value::as_str)
                .and_then(parse_wire_datetime),
            end: raw
                .get("endDateTime")
                .and_then(Value::as_str)
                .and_then(parse_wire_datetime),
            id: raw.get("id").and_then(Value::as_i64),
            lesson_id: raw.get("lessonId").and_then(Value::as_i64),
            homeworks: raw
                .get("homeWorks")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            exams: raw
                .get("exam")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            text: raw.get("text").cloned(),
            can: raw.get("can").cloned(),
            ist: raw.get("ist").cloned(),
            ..Self::default()
        };

        let Some(elements) = raw.get("elements").and_then(Value::as_array) else {
            return Ok(lesson);
        };
        for element in elements {
            let Some(id) = element.get("id") else {
                continue;
            };
            let tag = element.get("type").and_then(Value::as_str).unwrap_or("");
            let matches = |category| {
                master
                    .lookup(category, &[("id", id.clone())])
                    .map(|records| records.into_iter().cloned().collect::<Vec<_>>())
            };
            match ElementType::from_tag(tag) {
                ElementType::Class => lesson.klassen.extend(matches("klassen")?),
                ElementType::Teacher => lesson.teachers.extend(matches("teachers")?),
                ElementType::Subject => lesson.subjects.extend(matches("subjects")?),
                ElementType::Room => lesson.rooms.extend(matches("rooms")?),
                ElementType::Student | ElementType::Unknown(_) => {}
            }
        }
        Ok(lesson)
    }
}

/// A week of lessons bucketed by weekday. All seven slots are always
/// present; per-day order is the server's return order.
#[derive(Debug, Clone, Default)]
pub struct TimetableWeek {
    days: [Vec<Lesson>; 7],
}

impl TimetableWeek {
    pub fn day(&self, weekday: Weekday) -> &[Lesson] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &[Lesson])> {
        WEEKDAYS
            .iter()
            .zip(self.days.iter())
            .map(|(weekday, lessons)| (*weekday, lessons.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    pub fn lesson_count(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    pub(crate) fn push(&mut self, weekday: Weekday, lesson: Lesson) {
        self.days[weekday.num_days_from_monday() as usize].push(lesson);
    }
}

/// One non-empty week found while scanning forward through the school year.
#[derive(Debug, Clone)]
pub struct ResolvedWeek {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
    pub lessons: Vec<Lesson>,
}
