use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::week::parse_wire_date;

/// One master data record. The field schema is server-defined and not
/// validated locally.
pub type Record = Map<String, Value>;

/// The school's reference catalog (`klassen`, `teachers`, `rooms`,
/// `subjects`, `schoolyears`, ...) as delivered by `getUserData2017`.
/// Fetched once per session and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct MasterData(Map<String, Value>);

impl MasterData {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self(raw)
    }

    /// Records matching every predicate field, in server order.
    ///
    /// Matching is loose on purpose: a predicate key the record does not
    /// carry is ignored instead of rejecting the record. The mobile data
    /// schema differs between server versions, and strict matching would
    /// make lookups silently miss on older instances.
    pub fn lookup(
        &self,
        category: &str,
        predicate: &[(&str, Value)],
    ) -> Result<Vec<&Record>, LookupError> {
        Ok(self
            .records(category)?
            .filter(|record| {
                predicate.iter().all(|(key, want)| match record.get(*key) {
                    Some(have) => have == want,
                    None => true,
                })
            })
            .collect())
    }

    /// All records of a category, in server order. Entries that are not
    /// objects are skipped.
    pub fn records(
        &self,
        category: &str,
    ) -> Result<impl Iterator<Item = &Record>, LookupError> {
        let value = self
            .0
            .get(category)
            .ok_or_else(|| LookupError::UnknownCategory(category.to_owned()))?;
        let records = value
            .as_array()
            .ok_or_else(|| LookupError::NotACategory(category.to_owned()))?;
        Ok(records.iter().filter_map(Value::as_object))
    }

    /// The `schoolyears` record whose start/end interval contains `today`,
    /// if any.
    pub fn current_school_year(&self, today: NaiveDate) -> Result<Option<&Record>, LookupError> {
        for year in self.records("schoolyears")? {
            let start = year.get("startDate").and_then(Value::as_str);
            let end = year.get("endDate").and_then(Value::as_str);
            let (Some(start), Some(end)) = (
                start.and_then(parse_wire_date),
                end.and_then(parse_wire_date),
            ) else {
                continue;
            };
            if start <= today && today <= end {
                return Ok(Some(year));
            }
        }
        Ok(None)
    }
}

/// Client-side lookup failures, distinct from anything the server reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The snapshot has no category with this name.
    #[error("unknown master data category `{0}`")]
    UnknownCategory(String),
    /// The field exists in the snapshot but does not hold a record list
    /// (for example the `timeStamp` scalar sitting next to the categories).
    #[error("master data field `{0}` does not hold records")]
    NotACategory(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> MasterData {
        let Value::Object(raw) = json!({
            "timeStamp": 1709500000000_i64,
            "klassen": [
                { "id": 5505, "name": "5A", "longName": "Klasse 5A" },
                { "id": 12, "name": "5B", "longName": "Klasse 5B" },
            ],
            "schoolyears": [
                { "id": 1, "startDate": "2023-09-11", "endDate": "2024-07-26" },
                { "id": 2, "startDate": "2024-09-09", "endDate": "2025-07-25" },
            ],
        }) else {
            unreachable!()
        };
        MasterData::new(raw)
    }

    #[test]
    fn lookup_matches_on_every_supplied_field() {
        let master = sample();
        let hits = master.lookup("klassen", &[("id", json!(5505))]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "5A");

        let hits = master
            .lookup("klassen", &[("id", json!(5505)), ("name", json!("5B"))])
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn lookup_without_a_hit_is_empty_not_an_error() {
        let master = sample();
        assert!(master.lookup("klassen", &[("id", json!(9999))]).unwrap().is_empty());
    }

    // Predicate keys a record does not carry are ignored; this is load-bearing
    // for schemas that differ between server versions, not an accident.
    #[test]
    fn lookup_ignores_predicate_keys_the_record_lacks() {
        let master = sample();
        let hits = master
            .lookup("klassen", &[("nonexistentField", json!("x"))])
            .unwrap();
        assert_eq!(hits.len(), 2);

        // A key that is present still has to match.
        let hits = master
            .lookup("klassen", &[("nonexistentField", json!("x")), ("id", json!(12))])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "5B");
    }

    #[test]
    fn empty_predicate_returns_the_whole_category() {
        let master = sample();
        assert_eq!(master.lookup("klassen", &[]).unwrap().len(), 2);
    }

    #[test]
    fn unknown_category_is_a_typed_error() {
        let master = sample();
        assert_eq!(
            master.lookup("nope", &[]).unwrap_err(),
            LookupError::UnknownCategory("nope".to_owned())
        );
        assert_eq!(
            master.lookup("timeStamp", &[]).unwrap_err(),
            LookupError::NotACategory("timeStamp".to_owned())
        );
    }

    #[test]
    fn current_school_year_by_interval_containment() {
        let master = sample();
        let today = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let year = master.current_school_year(today).unwrap().unwrap();
        assert_eq!(year["id"], 1);

        let summer = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        assert!(master.current_school_year(summer).unwrap().is_none());
    }
}
