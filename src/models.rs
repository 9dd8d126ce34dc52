use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::err::Error;

pub const DEFAULT_STATUS: &str = "Active";
pub const NO_CLASS: &str = "No class";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentData {
    pub id: i64,
    pub name: String,
    pub birth_date: String,
    pub class_name: String,
    pub phone: String,
    pub email: String,
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub status: String,
}

impl StudentData {
    /// Single-line address, skipping whatever parts were left blank.
    pub fn address_line(&self) -> String {
        let join = |parts: &[&str], sep: &str| {
            parts
                .iter()
                .filter(|part| !part.trim().is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(sep)
        };

        let street = join(
            &[
                self.street.as_str(),
                self.number.as_str(),
                self.complement.as_str(),
            ],
            " ",
        );
        let locality = join(&[self.city.as_str(), self.state.as_str()], "/");
        join(
            &[
                street.as_str(),
                self.neighborhood.as_str(),
                locality.as_str(),
                self.postal_code.as_str(),
            ],
            ", ",
        )
    }

    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = parse_date(&self.birth_date).ok()?;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }
}

/// Student payload as it arrives over the wire. Every field may be absent;
/// [`StudentFields::normalize`] turns it into a [`NewStudent`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentFields {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub class_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub birth_date: String,
    pub class_name: String,
    pub phone: String,
    pub email: String,
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub status: String,
}

impl StudentFields {
    /// Validates the required fields and applies the write defaults: absent
    /// optional fields become empty strings and an empty status becomes
    /// [`DEFAULT_STATUS`].
    pub fn normalize(self) -> Result<NewStudent, Error> {
        let name = required(self.name, "name")?;
        let birth_date = required(self.birth_date, "birth_date")?;
        parse_date(&birth_date)?;

        let status = self
            .status
            .filter(|status| !status.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        Ok(NewStudent {
            name,
            birth_date,
            class_name: self.class_name.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
            street: self.street.unwrap_or_default(),
            number: self.number.unwrap_or_default(),
            complement: self.complement.unwrap_or_default(),
            neighborhood: self.neighborhood.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            state: self.state.unwrap_or_default(),
            status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub class_name: String,
    pub date: String,
    /// Stored and reported as `0`/`1`.
    #[serde(serialize_with = "presence_bit", deserialize_with = "presence_flag")]
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    pub student_id: i64,
    pub class_name: String,
    pub date: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RollCallLine {
    pub student_id: i64,
    pub name: String,
    #[serde(serialize_with = "presence_bit")]
    pub present: bool,
}

/// One checkbox of a roll-call submission.
#[derive(Debug, Clone, Deserialize)]
pub struct RollCallEntry {
    pub student_id: i64,
    #[serde(deserialize_with = "presence_flag")]
    pub present: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmitRollCall {
    pub class_name: Option<String>,
    pub date: Option<String>,
    pub records: Option<Vec<RollCallEntry>>,
    /// `null` and absent both mean "do not replace".
    pub replace: Option<bool>,
}

/// `(class_name, date)` query string identifying a roll-call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceKey {
    pub class_name: Option<String>,
    pub date: Option<String>,
}

impl AttendanceKey {
    pub fn require(self) -> Result<(String, String), Error> {
        let class_name = required(self.class_name, "class_name")?;
        let date = required(self.date, "date")?;
        parse_date(&date)?;
        Ok((class_name, date))
    }
}

pub fn required(value: Option<String>, field: &str) -> Result<String, Error> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::invalid(format!("`{}` is required", field))),
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        Error::invalid(format!("`{}` is not a valid YYYY-MM-DD date", value))
    })
}

fn presence_bit<S>(present: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*present))
}

fn presence_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => Ok(flag),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "`present` must be a boolean or 0/1, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str, birth_date: &str) -> StudentFields {
        StudentFields {
            name: Some(name.to_string()),
            birth_date: Some(birth_date.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_defaults_optional_fields() {
        let student = fields("Ana Silva", "2010-05-02").normalize().unwrap();
        assert_eq!(student.class_name, "");
        assert_eq!(student.city, "");
        assert_eq!(student.status, DEFAULT_STATUS);
    }

    #[test]
    fn normalize_keeps_explicit_status() {
        let mut payload = fields("Ana Silva", "2010-05-02");
        payload.status = Some("Transferred".to_string());
        assert_eq!(payload.normalize().unwrap().status, "Transferred");
    }

    #[test]
    fn normalize_rejects_blank_or_invalid_required_fields() {
        assert!(fields("   ", "2010-05-02").normalize().is_err());
        assert!(fields("Ana", "").normalize().is_err());
        assert!(fields("Ana", "02/05/2010").normalize().is_err());
        assert!(StudentFields::default().normalize().is_err());
    }

    #[test]
    fn presence_accepts_bools_and_bits() {
        let entries: Vec<RollCallEntry> = serde_json::from_str(
            r#"[{"student_id":1,"present":true},{"student_id":2,"present":0},{"student_id":3,"present":1}]"#,
        )
        .unwrap();
        let flags: Vec<bool> = entries.iter().map(|e| e.present).collect();
        assert_eq!(flags, vec![true, false, true]);

        assert!(serde_json::from_str::<RollCallEntry>(r#"{"student_id":1,"present":7}"#).is_err());
    }

    #[test]
    fn attendance_rows_report_presence_as_bits() {
        let row = AttendanceRecord {
            id: 1,
            student_id: 7,
            class_name: "5A".into(),
            date: "2024-03-01".into(),
            present: true,
        };
        let body = serde_json::to_value(&row).unwrap();
        assert_eq!(body["present"], serde_json::json!(1));

        let absent = AttendanceRecord {
            present: false,
            ..row
        };
        assert_eq!(serde_json::to_value(&absent).unwrap()["present"], serde_json::json!(0));
    }

    #[test]
    fn null_replace_means_no_replace() {
        let payload: SubmitRollCall = serde_json::from_str(
            r#"{"class_name":"5A","date":"2024-03-01","records":[],"replace":null}"#,
        )
        .unwrap();
        assert!(!payload.replace.unwrap_or_default());
    }

    #[test]
    fn age_counts_whole_years() {
        let student = StudentData {
            id: 1,
            name: "Ana".into(),
            birth_date: "2010-05-02".into(),
            class_name: "5A".into(),
            phone: String::new(),
            email: String::new(),
            postal_code: String::new(),
            street: String::new(),
            number: String::new(),
            complement: String::new(),
            neighborhood: String::new(),
            city: String::new(),
            state: String::new(),
            status: DEFAULT_STATUS.into(),
        };
        let day = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert_eq!(student.age_on(day("2024-05-01")), Some(13));
        assert_eq!(student.age_on(day("2024-05-02")), Some(14));
    }
}
