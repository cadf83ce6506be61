use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FormError;

macro_rules! form_fields {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(rename_all = "camelCase")]
        pub enum FormField {
            $($variant),+
        }

        impl FormField {
            /// Every field, in the order the enquiry form lays them out.
            pub const ALL: &'static [FormField] = &[$(FormField::$variant),+];

            pub fn wire_name(self) -> &'static str {
                match self {
                    $(FormField::$variant => $wire),+
                }
            }
        }

        impl FromStr for FormField {
            type Err = FormError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($wire => Ok(FormField::$variant),)+
                    other => Err(FormError::UnknownField(other.to_string())),
                }
            }
        }
    };
}

form_fields! {
    ChildName => "childName",
    DateOfBirth => "dateOfBirth",
    Sex => "sex",
    BloodGroup => "bloodGroup",
    ContactNumber => "contactNumber",
    ContactType => "contactType",
    FatherName => "fatherName",
    FatherNationality => "fatherNationality",
    FatherOccupation => "fatherOccupation",
    FatherOfficeAddress => "fatherOfficeAddress",
    FatherDistance => "fatherDistance",
    FatherPermanentAddress => "fatherPermanentAddress",
    FatherIncome => "fatherIncome",
    MotherName => "motherName",
    MotherNationality => "motherNationality",
    MotherOccupation => "motherOccupation",
    MotherOfficeAddress => "motherOfficeAddress",
    MotherDistance => "motherDistance",
    MotherPermanentAddress => "motherPermanentAddress",
    MotherIncome => "motherIncome",
    GuardianName => "guardianName",
    GuardianNationality => "guardianNationality",
    GuardianOccupation => "guardianOccupation",
    GuardianOfficeAddress => "guardianOfficeAddress",
    GuardianDistance => "guardianDistance",
    GuardianPermanentAddress => "guardianPermanentAddress",
    GuardianIncome => "guardianIncome",
    ClassAdmission => "classAdmission",
    TcAttached => "tcAttached",
    HowKnow => "howKnow",
}

pub const SEX_OPTIONS: &[&str] = &["MALE", "FEMALE"];
pub const BLOOD_GROUP_OPTIONS: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const CONTACT_TYPE_OPTIONS: &[&str] = &["FATHER", "MOTHER", "GUARDIAN"];
pub const CLASS_OPTIONS: &[&str] = &[
    "NURSERY", "LKG", "UKG", "CLASS 1", "CLASS 2", "CLASS 3", "CLASS 4", "CLASS 5", "CLASS 6",
    "CLASS 7", "CLASS 8", "CLASS 9", "CLASS 10", "CLASS 11", "CLASS 12",
];
pub const TC_OPTIONS: &[&str] = &["YES", "NO"];

impl FormField {
    pub fn is_required(self) -> bool {
        matches!(
            self,
            FormField::ChildName
                | FormField::DateOfBirth
                | FormField::Sex
                | FormField::ContactNumber
                | FormField::ContactType
                | FormField::ClassAdmission
                | FormField::TcAttached
                | FormField::HowKnow
        )
    }

    /// Dates keep the `YYYY-MM-DD` shape produced by a date input.
    pub fn is_upper_cased(self) -> bool {
        self != FormField::DateOfBirth
    }

    /// Closed option set for fields rendered as a select, `None` for free text.
    pub fn options(self) -> Option<&'static [&'static str]> {
        match self {
            FormField::Sex => Some(SEX_OPTIONS),
            FormField::BloodGroup => Some(BLOOD_GROUP_OPTIONS),
            FormField::ContactType => Some(CONTACT_TYPE_OPTIONS),
            FormField::ClassAdmission => Some(CLASS_OPTIONS),
            FormField::TcAttached => Some(TC_OPTIONS),
            _ => None,
        }
    }

    pub fn required() -> impl Iterator<Item = FormField> {
        Self::ALL.iter().copied().filter(|field| field.is_required())
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentRole {
    Father,
    Mother,
    Guardian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentAttribute {
    Name,
    Nationality,
    Occupation,
    OfficeAddress,
    Distance,
    PermanentAddress,
    Income,
}

impl ParentRole {
    pub const ALL: [ParentRole; 3] = [ParentRole::Father, ParentRole::Mother, ParentRole::Guardian];

    pub fn label(self) -> &'static str {
        match self {
            ParentRole::Father => "Father",
            ParentRole::Mother => "Mother",
            ParentRole::Guardian => "Guardian",
        }
    }

    pub fn field(self, attribute: ParentAttribute) -> FormField {
        use FormField::*;
        use ParentAttribute as A;

        match (self, attribute) {
            (ParentRole::Father, A::Name) => FatherName,
            (ParentRole::Father, A::Nationality) => FatherNationality,
            (ParentRole::Father, A::Occupation) => FatherOccupation,
            (ParentRole::Father, A::OfficeAddress) => FatherOfficeAddress,
            (ParentRole::Father, A::Distance) => FatherDistance,
            (ParentRole::Father, A::PermanentAddress) => FatherPermanentAddress,
            (ParentRole::Father, A::Income) => FatherIncome,
            (ParentRole::Mother, A::Name) => MotherName,
            (ParentRole::Mother, A::Nationality) => MotherNationality,
            (ParentRole::Mother, A::Occupation) => MotherOccupation,
            (ParentRole::Mother, A::OfficeAddress) => MotherOfficeAddress,
            (ParentRole::Mother, A::Distance) => MotherDistance,
            (ParentRole::Mother, A::PermanentAddress) => MotherPermanentAddress,
            (ParentRole::Mother, A::Income) => MotherIncome,
            (ParentRole::Guardian, A::Name) => GuardianName,
            (ParentRole::Guardian, A::Nationality) => GuardianNationality,
            (ParentRole::Guardian, A::Occupation) => GuardianOccupation,
            (ParentRole::Guardian, A::OfficeAddress) => GuardianOfficeAddress,
            (ParentRole::Guardian, A::Distance) => GuardianDistance,
            (ParentRole::Guardian, A::PermanentAddress) => GuardianPermanentAddress,
            (ParentRole::Guardian, A::Income) => GuardianIncome,
        }
    }
}

impl ParentAttribute {
    pub const ALL: [ParentAttribute; 7] = [
        ParentAttribute::Name,
        ParentAttribute::Nationality,
        ParentAttribute::Occupation,
        ParentAttribute::OfficeAddress,
        ParentAttribute::Distance,
        ParentAttribute::PermanentAddress,
        ParentAttribute::Income,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ParentAttribute::Name => "Name",
            ParentAttribute::Nationality => "Nationality",
            ParentAttribute::Occupation => "Occupation",
            ParentAttribute::OfficeAddress => "Office Address",
            ParentAttribute::Distance => "Distance",
            ParentAttribute::PermanentAddress => "Permanent Address",
            ParentAttribute::Income => "Monthly Income",
        }
    }
}

pub const DEFAULT_REFERENCE_PREFIX: &str = "MVM";
const REFERENCE_SUFFIX_LEN: usize = 8;
const BASE36_UPPER: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Human-readable tracking token, `<PREFIX>/<YYYY>/<8 chars of [0-9A-Z]>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn generate(prefix: &str, at: DateTime<Utc>) -> Self {
        Self::generate_with(prefix, at, &mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng>(prefix: &str, at: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: String = (0..REFERENCE_SUFFIX_LEN)
            .map(|_| char::from(BASE36_UPPER[rng.gen_range(0..BASE36_UPPER.len())]))
            .collect();
        Self(format!("{prefix}/{:04}/{suffix}", at.year()))
    }

    pub fn parse(prefix: &str, raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(prefix)?.strip_prefix('/')?;
        let (year, suffix) = rest.split_once('/')?;
        let year_ok = year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit());
        let suffix_ok = suffix.len() == REFERENCE_SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());
        (year_ok && suffix_ok).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
