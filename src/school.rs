use chrono::{Datelike, NaiveDate, Utc};
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use hyper::client::connect::Connect;
use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::{
    master::{LookupError, MasterData, Record},
    session::{SchoolInfo, Session, SessionError},
    timetable::{ElementType, Lesson, ResolvedWeek, TimetableWeek},
    week::{self, week_bounds, WeekIter},
};

/// One authenticated (possibly anonymous) context against a school.
///
/// Construction resolves the school on the central search endpoint and
/// fetches the master data snapshot once; the snapshot stays fixed until
/// [`School::refresh_master_data`] is called explicitly.
pub struct School<T> {
    session: Session<T>,
    info: SchoolInfo,
    master_data: MasterData,
    user_data: Value,
    settings: Value,
}

impl<T> School<T>
where
    T: Connect + Clone + Send + Sync + 'static,
{
    pub async fn new(session: Session<T>) -> Result<Self, SchoolError> {
        let info = session
            .search_school(session.school())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SchoolError::SchoolNotFound(session.school().to_owned()))?;
        info!("resolved school `{}` on {}", info.display_name, info.server);
        let mut school = Self {
            session,
            info,
            master_data: MasterData::default(),
            user_data: Value::Null,
            settings: Value::Null,
        };
        school.refresh_master_data().await?;
        Ok(school)
    }

    /// Re-runs `getUserData2017` and swaps in the new snapshot. Lessons
    /// resolved against the old snapshot keep their copies.
    pub async fn refresh_master_data(&mut self) -> Result<(), SchoolError> {
        let mut result = match self.session.get_user_data().await? {
            Value::Object(result) => result,
            _ => return Err(SessionError::Malformed("getUserData result").into()),
        };
        let master = match result.remove("masterData") {
            Some(Value::Object(master)) => master,
            _ => return Err(SessionError::Malformed("masterData").into()),
        };
        self.master_data = MasterData::new(master);
        self.user_data = result.remove("userData").unwrap_or(Value::Null);
        self.settings = result.remove("settings").unwrap_or(Value::Null);
        Ok(())
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn info(&self) -> &SchoolInfo {
        &self.info
    }

    pub fn master_data(&self) -> &MasterData {
        &self.master_data
    }

    pub fn user_data(&self) -> &Value {
        &self.user_data
    }

    pub fn settings(&self) -> &Value {
        &self.settings
    }

    pub fn find_klassen_where(
        &self,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        self.master_data.lookup("klassen", predicate)
    }

    pub fn find_teachers_where(
        &self,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        self.master_data.lookup("teachers", predicate)
    }

    pub fn find_rooms_where(
        &self,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        self.master_data.lookup("rooms", predicate)
    }

    pub fn find_subjects_where(
        &self,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        self.master_data.lookup("subjects", predicate)
    }

    pub fn find_departments_where(
        &self,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        self.master_data.lookup("departments", predicate)
    }

    /// The timetable of the week containing `date`, resolved and bucketed
    /// by weekday. A week without periods comes back with all seven day
    /// slots present and empty.
    pub async fn timetable_week(
        &self,
        id: &str,
        kind: &ElementType,
        date: NaiveDate,
    ) -> Result<TimetableWeek, SchoolError> {
        let (monday, sunday) = week_bounds(date);
        let result = self
            .session
            .get_timetable(monday, sunday, id, kind)
            .await?;
        bucket_week(periods_of(&result)?, &self.master_data)
    }

    /// Scans forward from today to the end of the current school year and
    /// returns the first week with timetable data, or `None` when the rest
    /// of the year is empty.
    pub async fn next_week_with_data(
        &self,
        id: &str,
        kind: &ElementType,
    ) -> Result<Option<ResolvedWeek>, SchoolError> {
        let today = Utc::now().date_naive();
        let end = self.school_year_end(today)?;
        for (monday, sunday) in WeekIter::new(today, end) {
            let result = self.session.get_timetable(monday, sunday, id, kind).await?;
            let periods = periods_of(&result)?;
            if periods.is_empty() {
                debug!("no periods between {monday} and {sunday}");
                continue;
            }
            info!("found {} periods in the week of {monday}", periods.len());
            return Ok(Some(ResolvedWeek {
                monday,
                sunday,
                lessons: resolve_periods(periods, &self.master_data)?,
            }));
        }
        Ok(None)
    }

    /// Lazy variant of [`School::next_week_with_data`]: every remaining week
    /// of the school year that has timetable data, in order. The stream is
    /// finite and driving a fresh one from the same day reproduces the same
    /// sequence.
    pub fn data_weeks<'a>(
        &'a self,
        id: &str,
        kind: ElementType,
    ) -> Result<impl Stream<Item = Result<ResolvedWeek, SchoolError>> + 'a, SchoolError> {
        let today = Utc::now().date_naive();
        let end = self.school_year_end(today)?;
        let id = id.to_owned();
        Ok(stream::iter(WeekIter::new(today, end))
            .then(move |(monday, sunday)| {
                let id = id.clone();
                let kind = kind.clone();
                async move {
                    let result = self.session.get_timetable(monday, sunday, &id, &kind).await?;
                    let lessons = resolve_periods(periods_of(&result)?, &self.master_data)?;
                    Ok::<_, SchoolError>(ResolvedWeek {
                        monday,
                        sunday,
                        lessons,
                    })
                }
            })
            .try_filter(|week| future::ready(!week.lessons.is_empty())))
    }

    fn school_year_end(&self, today: NaiveDate) -> Result<NaiveDate, SchoolError> {
        let year = self
            .master_data
            .current_school_year(today)?
            .ok_or(SchoolError::NoCurrentSchoolYear)?;
        year.get("endDate")
            .and_then(Value::as_str)
            .and_then(week::parse_wire_date)
            .ok_or_else(|| SessionError::Malformed("school year endDate").into())
    }
}

fn periods_of(result: &Value) -> Result<&[Value], SessionError> {
    result
        .get("timetable")
        .and_then(|timetable| timetable.get("periods"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or(SessionError::Malformed("timetable periods"))
}

fn resolve_periods(periods: &[Value], master: &MasterData) -> Result<Vec<Lesson>, LookupError> {
    periods
        .iter()
        .map(|period| Lesson::resolve(period, master))
        .collect()
}

fn bucket_week(periods: &[Value], master: &MasterData) -> Result<TimetableWeek, SchoolError> {
    let mut week = TimetableWeek::default();
    for period in periods {
        let lesson = Lesson::resolve(period, master)?;
        match lesson.start {
            Some(start) => week.push(start.weekday(), lesson),
            None => warn!("dropping a period without a start date-time"),
        }
    }
    Ok(week)
}

#[derive(Debug, Error)]
pub enum SchoolError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// The central search knows no school under this login name.
    #[error("no school found for login name `{0}`")]
    SchoolNotFound(String),
    /// No `schoolyears` interval contains today, so there is no end date to
    /// scan towards.
    #[error("no school year contains today's date")]
    NoCurrentSchoolYear,
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use serde_json::json;

    use super::*;

    fn master() -> MasterData {
        let Value::Object(raw) = json!({
            "klassen": [{ "id": 1, "name": "5A" }],
            "teachers": [{ "id": 2, "name": "MUS" }],
            "subjects": [{ "id": 4, "name": "M" }],
            "rooms": [{ "id": 5, "name": "R101" }],
        }) else {
            unreachable!()
        };
        MasterData::new(raw)
    }

    #[test]
    fn empty_period_list_buckets_into_seven_empty_days() {
        let week = bucket_week(&[], &master()).unwrap();
        assert_eq!(week.iter().count(), 7);
        assert!(week.is_empty());
    }

    #[test]
    fn periods_land_on_the_weekday_of_their_start_in_server_order() {
        let periods = vec![
            json!({
                "startDateTime": "2024-03-04T08:00Z",
                "id": 1,
                "elements": [{ "type": "TEACHER", "id": 2 }],
            }),
            json!({
                "startDateTime": "2024-03-06T08:00Z",
                "id": 2,
                "elements": [],
            }),
            json!({
                "startDateTime": "2024-03-04T08:45Z",
                "id": 3,
                "elements": [],
            }),
        ];
        let week = bucket_week(&periods, &master()).unwrap();
        assert_eq!(week.lesson_count(), 3);

        let monday = week.day(Weekday::Mon);
        assert_eq!(monday.len(), 2);
        assert_eq!(monday[0].id, Some(1));
        assert_eq!(monday[1].id, Some(3));
        assert_eq!(monday[0].teachers[0]["name"], "MUS");

        assert_eq!(week.day(Weekday::Wed).len(), 1);
        assert!(week.day(Weekday::Tue).is_empty());
        assert!(week.day(Weekday::Sun).is_empty());
    }

    #[test]
    fn periods_are_read_from_the_timetable_result() {
        let result = json!({ "timetable": { "periods": [{ "id": 1 }] } });
        assert_eq!(periods_of(&result).unwrap().len(), 1);

        assert!(matches!(
            periods_of(&json!({ "timetable": {} })),
            Err(SessionError::Malformed(_))
        ));
    }
}
