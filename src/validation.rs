//! Field validation of incoming payloads, run before any store access.
//!
//! Validators trim free text in place, then check it. All failing fields are
//! reported together.

use crate::error::{Error, FieldError, Result};
use crate::model::{
    Credentials, NewApplication, NewProject, NewUser, ProfileUpdate, ProjectUpdate,
};

const LETTER_MIN: usize = 50;
const LETTER_MAX: usize = 1000;
const NOTES_MAX: usize = 1000;
const BIO_MAX: usize = 500;
const DESCRIPTION_MIN: usize = 50;
const DESCRIPTION_MAX: usize = 2000;
const TITLE_MIN: usize = 5;
const NAME_MIN: usize = 2;
const PASSWORD_MIN: usize = 6;
const GPA_MAX: f64 = 4.0;

#[derive(Default)]
struct Checks(Vec<FieldError>);

impl Checks {
    fn fail(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn min_len(&mut self, field: &'static str, value: &str, min: usize, message: &str) {
        if value.chars().count() < min {
            self.fail(field, message);
        }
    }

    fn max_len(&mut self, field: &'static str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.fail(field, format!("must be at most {max} characters"));
        }
    }

    fn gpa(&mut self, field: &'static str, gpa: Option<f64>) {
        if let Some(gpa) = gpa {
            if !(0.0..=GPA_MAX).contains(&gpa) {
                self.fail(field, "GPA must be between 0 and 4.0");
            }
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.0))
        }
    }
}

fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
    }
}

fn trim_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        trim(v);
    }
}

fn trim_all(values: &mut Vec<String>) {
    values.iter_mut().for_each(trim);
    values.retain(|v| !v.is_empty());
}

fn is_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.contains('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

pub fn registration(user: &mut NewUser) -> Result<()> {
    trim(&mut user.name);
    trim(&mut user.department);
    user.email = user.email.trim().to_lowercase();
    trim_opt(&mut user.bio);
    trim_all(&mut user.skills);
    trim_all(&mut user.interests);
    let mut checks = Checks::default();
    checks.min_len("name", &user.name, NAME_MIN, "Name must be at least 2 characters");
    if !is_email(&user.email) {
        checks.fail("email", "Please provide a valid email");
    }
    checks.min_len(
        "password",
        &user.password,
        PASSWORD_MIN,
        "Password must be at least 6 characters",
    );
    checks.min_len("department", &user.department, NAME_MIN, "Department is required");
    if let Some(bio) = &user.bio {
        checks.max_len("bio", bio, BIO_MAX);
    }
    checks.gpa("gpa", user.gpa);
    checks.finish()
}

pub fn login(credentials: &mut Credentials) -> Result<()> {
    credentials.email = credentials.email.trim().to_lowercase();
    let mut checks = Checks::default();
    if !is_email(&credentials.email) {
        checks.fail("email", "Please provide a valid email");
    }
    checks.min_len("password", &credentials.password, 1, "Password is required");
    checks.finish()
}

pub fn profile(update: &mut ProfileUpdate) -> Result<()> {
    trim_opt(&mut update.name);
    trim_opt(&mut update.bio);
    if let Some(skills) = &mut update.skills {
        trim_all(skills);
    }
    if let Some(interests) = &mut update.interests {
        trim_all(interests);
    }
    let mut checks = Checks::default();
    if let Some(name) = &update.name {
        checks.min_len("name", name, NAME_MIN, "Name must be at least 2 characters");
    }
    if let Some(bio) = &update.bio {
        checks.max_len("bio", bio, BIO_MAX);
    }
    checks.gpa("gpa", update.gpa);
    checks.finish()
}

pub fn new_project(project: &mut NewProject) -> Result<()> {
    trim(&mut project.title);
    trim(&mut project.description);
    trim(&mut project.department);
    trim(&mut project.duration);
    trim(&mut project.time_commitment);
    trim_opt(&mut project.compensation_amount);
    trim_all(&mut project.skills);
    trim_all(&mut project.tags);
    let mut checks = Checks::default();
    checks.min_len("title", &project.title, TITLE_MIN, "Title must be at least 5 characters");
    checks.min_len(
        "description",
        &project.description,
        DESCRIPTION_MIN,
        "Description must be at least 50 characters",
    );
    checks.max_len("description", &project.description, DESCRIPTION_MAX);
    checks.min_len("department", &project.department, NAME_MIN, "Department is required");
    checks.min_len("duration", &project.duration, 1, "Duration is required");
    checks.min_len(
        "timeCommitment",
        &project.time_commitment,
        1,
        "Time commitment is required",
    );
    if project.max_students < 1 {
        checks.fail("maxStudents", "must be at least 1");
    }
    checks.gpa("requirements.gpa", project.requirements.gpa);
    if let (Some(start), Some(end)) = (project.start_date, project.end_date) {
        if end < start {
            checks.fail("endDate", "must not be before the start date");
        }
    }
    checks.finish()
}

pub fn project_update(update: &mut ProjectUpdate) -> Result<()> {
    trim_opt(&mut update.title);
    trim_opt(&mut update.description);
    trim_opt(&mut update.department);
    trim_opt(&mut update.duration);
    trim_opt(&mut update.time_commitment);
    if let Some(amount) = &mut update.compensation_amount {
        trim_opt(amount);
    }
    if let Some(skills) = &mut update.skills {
        trim_all(skills);
    }
    if let Some(tags) = &mut update.tags {
        trim_all(tags);
    }
    let mut checks = Checks::default();
    if let Some(title) = &update.title {
        checks.min_len("title", title, TITLE_MIN, "Title must be at least 5 characters");
    }
    if let Some(description) = &update.description {
        checks.min_len(
            "description",
            description,
            DESCRIPTION_MIN,
            "Description must be at least 50 characters",
        );
        checks.max_len("description", description, DESCRIPTION_MAX);
    }
    if let Some(department) = &update.department {
        checks.min_len("department", department, NAME_MIN, "Department is required");
    }
    if let Some(duration) = &update.duration {
        checks.min_len("duration", duration, 1, "Duration is required");
    }
    if let Some(time_commitment) = &update.time_commitment {
        checks.min_len("timeCommitment", time_commitment, 1, "Time commitment is required");
    }
    if update.max_students.is_some_and(|n| n < 1) {
        checks.fail("maxStudents", "must be at least 1");
    }
    if let Some(requirements) = &update.requirements {
        checks.gpa("requirements.gpa", requirements.gpa);
    }
    if let (Some(Some(start)), Some(Some(end))) = (update.start_date, update.end_date) {
        if end < start {
            checks.fail("endDate", "must not be before the start date");
        }
    }
    checks.finish()
}

pub fn application(application: &mut NewApplication) -> Result<()> {
    trim(&mut application.cover_letter);
    trim(&mut application.motivation);
    trim_opt(&mut application.relevant_experience);
    let mut checks = Checks::default();
    checks.min_len(
        "coverLetter",
        &application.cover_letter,
        LETTER_MIN,
        "Cover letter must be at least 50 characters",
    );
    checks.max_len("coverLetter", &application.cover_letter, LETTER_MAX);
    checks.min_len(
        "motivation",
        &application.motivation,
        LETTER_MIN,
        "Motivation must be at least 50 characters",
    );
    checks.max_len("motivation", &application.motivation, LETTER_MAX);
    if let Some(experience) = &application.relevant_experience {
        checks.max_len("relevantExperience", experience, LETTER_MAX);
    }
    checks.finish()
}

pub fn professor_notes(notes: &mut Option<String>) -> Result<()> {
    trim_opt(notes);
    let mut checks = Checks::default();
    if let Some(notes) = notes {
        checks.max_len("professorNotes", notes, NOTES_MAX);
    }
    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProjectId, Role};

    fn fields(result: Result<()>) -> Vec<&'static str> {
        match result {
            Ok(()) => vec![],
            Err(Error::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_application_letters() {
        let mut a = NewApplication {
            project_id: ProjectId(1),
            cover_letter: format!("   {}   ", "x".repeat(50)),
            relevant_experience: Some("  none ".into()),
            motivation: "too short".into(),
        };
        assert_eq!(fields(application(&mut a)), vec!["motivation"]);
        assert_eq!(a.cover_letter.len(), 50);
        assert_eq!(a.relevant_experience.as_deref(), Some("none"));
        a.motivation = "é".repeat(50);
        assert_eq!(fields(application(&mut a)), Vec::<&str>::new());
        a.cover_letter = "y".repeat(1001);
        assert_eq!(fields(application(&mut a)), vec!["coverLetter"]);
    }

    #[test]
    fn test_registration() {
        let mut user = NewUser {
            name: " A ".into(),
            email: " Someone@Example.EDU ".into(),
            password: "hunter".into(),
            role: Role::Student,
            department: "CS".into(),
            bio: None,
            skills: vec![" rust ".into(), "  ".into()],
            interests: vec![],
            gpa: Some(4.2),
            year: None,
        };
        assert_eq!(fields(registration(&mut user)), vec!["name", "gpa"]);
        assert_eq!(user.email, "someone@example.edu");
        assert_eq!(user.skills, vec!["rust"]);
        user.name = "Ada".into();
        user.gpa = Some(3.5);
        assert!(registration(&mut user).is_ok());
        for email in ["nobody", "@example.edu", "a@localhost", "a b@example.edu", "a@.edu"] {
            user.email = email.into();
            assert_eq!(fields(registration(&mut user)), vec!["email"], "{email}");
        }
        user.email = "ada@example.edu".into();
        user.password = "12345".into();
        assert_eq!(fields(registration(&mut user)), vec!["password"]);
    }

    #[test]
    fn test_login() {
        let mut credentials = Credentials {
            email: " Ada@Example.edu".into(),
            password: String::new(),
        };
        assert_eq!(fields(login(&mut credentials)), vec!["password"]);
        assert_eq!(credentials.email, "ada@example.edu");
        credentials.password = "secret".into();
        assert!(login(&mut credentials).is_ok());
    }

    #[test]
    fn test_project_update() {
        let mut update = ProjectUpdate {
            title: Some("tiny".into()),
            max_students: Some(0),
            ..ProjectUpdate::default()
        };
        assert_eq!(
            fields(project_update(&mut update)),
            vec!["title", "maxStudents"]
        );
        assert!(project_update(&mut ProjectUpdate::default()).is_ok());

        let now = chrono::Utc::now();
        let mut update = ProjectUpdate {
            start_date: Some(Some(now)),
            end_date: Some(Some(now - chrono::Duration::days(1))),
            compensation_amount: Some(Some(" $12 ".into())),
            ..ProjectUpdate::default()
        };
        assert_eq!(fields(project_update(&mut update)), vec!["endDate"]);
        assert_eq!(update.compensation_amount, Some(Some("$12".into())));
        update.end_date = Some(None);
        assert!(project_update(&mut update).is_ok());
    }

    #[test]
    fn test_notes() {
        let mut notes = Some(format!(" {} ", "n".repeat(1000)));
        assert!(professor_notes(&mut notes).is_ok());
        let mut notes = Some("n".repeat(1001));
        assert_eq!(fields(professor_notes(&mut notes)), vec!["professorNotes"]);
        assert!(professor_notes(&mut None).is_ok());
    }
}
