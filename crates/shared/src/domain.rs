use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(StoryId);

/// Genres offered by the story creation form.
pub const GENRE_CATALOGUE: &[&str] = &[
    "Adventure",
    "Fantasy",
    "Science Fiction",
    "Mystery",
    "Educational",
];

/// Page counts offered by the story creation form.
pub const PAGE_COUNT_CHOICES: std::ops::RangeInclusive<u32> = 1..=5;

/// Validated inputs for starting a story. Fixed once a session has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryParameters {
    pub genre: String,
    pub target_age: u32,
    pub choice_count: u32,
    pub page_count: u32,
    pub seed_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Genre,
    Age,
    ChoiceCount,
    PageCount,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormField::Genre => "genre",
            FormField::Age => "age",
            FormField::ChoiceCount => "choice count",
            FormField::PageCount => "page count",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(FormField),
    #[error("{field} must be a whole number, got {value:?}")]
    NotANumber { field: FormField, value: String },
    #[error("{0} must be positive")]
    NotPositive(FormField),
}

impl ValidationError {
    pub fn field(&self) -> FormField {
        match self {
            ValidationError::Missing(field) | ValidationError::NotPositive(field) => *field,
            ValidationError::NotANumber { field, .. } => *field,
        }
    }
}

/// Raw form input, kept exactly as typed. Editing a field never validates;
/// [`StoryForm::validate`] runs only when a story is started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryForm {
    pub genre: String,
    pub age: String,
    pub choice_count: String,
    pub page_count: String,
    pub seed_text: String,
}

impl StoryForm {
    pub fn validate(&self) -> Result<StoryParameters, ValidationError> {
        let genre = self.genre.trim();
        if genre.is_empty() {
            return Err(ValidationError::Missing(FormField::Genre));
        }

        Ok(StoryParameters {
            genre: genre.to_string(),
            target_age: parse_positive(FormField::Age, &self.age)?,
            choice_count: parse_positive(FormField::ChoiceCount, &self.choice_count)?,
            page_count: parse_positive(FormField::PageCount, &self.page_count)?,
            seed_text: self.seed_text.clone(),
        })
    }
}

impl StoryParameters {
    /// Re-checks already typed parameters, for callers that build them
    /// without going through a [`StoryForm`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.genre.trim().is_empty() {
            return Err(ValidationError::Missing(FormField::Genre));
        }
        for (field, value) in [
            (FormField::Age, self.target_age),
            (FormField::ChoiceCount, self.choice_count),
            (FormField::PageCount, self.page_count),
        ] {
            if value == 0 {
                return Err(ValidationError::NotPositive(field));
            }
        }
        Ok(())
    }
}

fn parse_positive(field: FormField, raw: &str) -> Result<u32, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    let value: i64 = raw.parse().map_err(|_| ValidationError::NotANumber {
        field,
        value: raw.to_string(),
    })?;
    if value <= 0 {
        return Err(ValidationError::NotPositive(field));
    }
    u32::try_from(value).map_err(|_| ValidationError::NotANumber {
        field,
        value: raw.to_string(),
    })
}
