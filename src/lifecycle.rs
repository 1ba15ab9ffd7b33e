//! Application lifecycle: submission, decision and withdrawal.
//!
//! Every application starts `pending` and leaves that state at most once,
//! through [`ApplicationStatus::apply`]. Accepting an application takes a
//! seat of its project; the state change and the seat are committed in the
//! same transaction, so that after any completed operation the number of
//! enrolled students of a project equals its number of accepted
//! applications.

use crate::error::{Conflict, Error, Result};
use crate::model::{
    Application, ApplicationDetails, ApplicationId, Decision, NewApplication, Transition, UserId,
};
use crate::store::{Store, applications, projects};
use chrono::Utc;
use sqlx::sqlite::SqliteExecutor;
use tracing::{debug, info, instrument};

pub struct Lifecycle<'a> {
    store: &'a Store,
}

impl<'a> Lifecycle<'a> {
    pub fn new(store: &'a Store) -> Lifecycle<'a> {
        Lifecycle { store }
    }

    #[instrument(skip(self, application), fields(project = %application.project_id))]
    pub async fn submit(
        &self,
        student: UserId,
        application: &NewApplication,
    ) -> Result<Application> {
        let project = projects::find(self.store.pool(), application.project_id)
            .await?
            .ok_or(Error::NotFound("project"))?;
        let now = Utc::now();
        project.accepts_applications_at(now)?;
        let application =
            applications::insert(self.store.pool(), student, &project, application, now).await?;
        info!(application = %application.id, "application submitted");
        Ok(application)
    }

    /// Accept or reject a pending application on behalf of the professor
    /// owning its project.
    #[instrument(skip(self, notes))]
    pub async fn decide(
        &self,
        professor: UserId,
        id: ApplicationId,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<Application> {
        let application = applications::find(self.store.pool(), id)
            .await?
            .ok_or(Error::NotFound("application"))?;
        if application.professor != professor {
            return Err(Error::Forbidden("update this application"));
        }
        let transition = Transition::from(decision);
        let target = application.status.apply(transition)?;

        let mut tx = self.store.begin().await?;
        let Some(decided) =
            applications::leave_pending(&mut *tx, id, target, notes, Some(Utc::now())).await?
        else {
            return Err(lost_race(&mut *tx, id, transition).await);
        };
        if decision == Decision::Accept
            && !projects::try_increment(&mut *tx, decided.project).await?
        {
            tx.rollback().await?;
            debug!(project = %decided.project, "no seat left");
            return Err(Conflict::AtCapacity.into());
        }
        tx.commit().await?;
        info!(application = %id, status = %decided.status, "application decided");
        Ok(decided)
    }

    /// Withdraw a pending application on behalf of the student who
    /// submitted it. Withdrawal never changes the number of seats taken.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, student: UserId, id: ApplicationId) -> Result<()> {
        let application = applications::find(self.store.pool(), id)
            .await?
            .ok_or(Error::NotFound("application"))?;
        if application.student != student {
            return Err(Error::Forbidden("withdraw this application"));
        }
        let target = application.status.apply(Transition::Withdraw)?;
        if applications::leave_pending(self.store.pool(), id, target, None, None)
            .await?
            .is_none()
        {
            return Err(lost_race(self.store.pool(), id, Transition::Withdraw).await);
        }
        info!(application = %id, "application withdrawn");
        Ok(())
    }

    pub async fn applications_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<ApplicationDetails>> {
        applications::for_student(self.store.pool(), student).await
    }

    pub async fn applications_for_professor(
        &self,
        professor: UserId,
    ) -> Result<Vec<ApplicationDetails>> {
        applications::for_professor(self.store.pool(), professor).await
    }
}

/// Why an application which was pending when first read could not leave
/// that state: it has been decided or withdrawn since, or deleted along with
/// its project.
async fn lost_race<'e>(
    db: impl SqliteExecutor<'e>,
    id: ApplicationId,
    transition: Transition,
) -> Error {
    match applications::find(db, id).await {
        Ok(Some(current)) => Conflict::InvalidTransition {
            from: current.status,
            transition,
        }
        .into(),
        Ok(None) => Error::NotFound("application"),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ApplicationStatus, NewProject, Project, ProjectId, ProjectStatus, ProjectUpdate, Role,
    };
    use crate::store::projects::tests::new_project;
    use crate::store::users::{self, tests::new_user};
    use chrono::Duration;
    use tokio::task::JoinSet;

    struct Fixture {
        store: Store,
        professor: UserId,
        students: Vec<UserId>,
    }

    impl Fixture {
        async fn new(store: Store, students: usize) -> Fixture {
            let now = Utc::now();
            let professor = users::register(
                store.pool(),
                &new_user("Donald Knuth", Role::Professor, "Computer Science"),
                "professor",
                now,
            )
            .await
            .unwrap()
            .id;
            let mut ids = Vec::new();
            for i in 0..students {
                let id = users::register(
                    store.pool(),
                    &new_user(&format!("Student {i}"), Role::Student, "Mathematics"),
                    &format!("student-{i}"),
                    now,
                )
                .await
                .unwrap()
                .id;
                ids.push(id);
            }
            Fixture {
                store,
                professor,
                students: ids,
            }
        }

        async fn project(&self, project: NewProject) -> Project {
            projects::create(self.store.pool(), self.professor, &project, Utc::now())
                .await
                .unwrap()
        }

        fn lifecycle(&self) -> Lifecycle<'_> {
            Lifecycle::new(&self.store)
        }

        async fn seats(&self, project: &Project) -> (i64, i64) {
            let c = projects::capacity(self.store.pool(), project.id)
                .await
                .unwrap()
                .unwrap();
            (c.current_students, c.max_students)
        }
    }

    impl Lifecycle<'_> {
        /// Seats taken in a project match its accepted applications.
        async fn is_consistent(&self, project: ProjectId) -> Result<bool> {
            let capacity = projects::capacity(self.store.pool(), project)
                .await?
                .ok_or(Error::NotFound("project"))?;
            let accepted = applications::count_with_status(
                self.store.pool(),
                project,
                ApplicationStatus::Accepted,
            )
            .await?;
            Ok(capacity.current_students == accepted
                && (0..=capacity.max_students).contains(&capacity.current_students))
        }
    }

    fn letter(project: &Project) -> NewApplication {
        NewApplication {
            project_id: project.id,
            cover_letter: "I have read your last three papers on this topic with great interest."
                .into(),
            relevant_experience: Some("Summer internship".into()),
            motivation: "I would like to learn how research is conducted in practice.".into(),
        }
    }

    #[tokio::test]
    async fn test_accept_until_capacity() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 2).await;
        let (a, b) = (f.students[0], f.students[1]);
        let p = f.project(new_project("Literate programming", 1)).await;
        let l = f.lifecycle();

        let first = l.submit(a, &letter(&p)).await.unwrap();
        assert_eq!(first.status, ApplicationStatus::Pending);
        let accepted = l
            .decide(f.professor, first.id, Decision::Accept, Some("Welcome"))
            .await
            .unwrap();
        assert_eq!(accepted.status, ApplicationStatus::Accepted);
        assert!(accepted.response_date.is_some());
        assert_eq!(accepted.professor_notes.as_deref(), Some("Welcome"));
        assert_eq!(f.seats(&p).await, (1, 1));

        // Submitting is still possible when the project is full.
        let second = l.submit(b, &letter(&p)).await.unwrap();
        assert_eq!(second.status, ApplicationStatus::Pending);
        let err = l
            .decide(f.professor, second.id, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::AtCapacity)));

        // Nothing changed, the application can still be rejected.
        assert_eq!(f.seats(&p).await, (1, 1));
        let second = applications::find(f.store.pool(), second.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.status, ApplicationStatus::Pending);
        assert!(second.response_date.is_none());
        assert!(l.is_consistent(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_reject_round_trip() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 1).await;
        let p = f.project(new_project("Concrete mathematics", 3)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p)).await.unwrap();
        l.decide(f.professor, a.id, Decision::Reject, Some("Too early"))
            .await
            .unwrap();
        let a = applications::find(f.store.pool(), a.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.status, ApplicationStatus::Rejected);
        assert!(a.response_date.is_some());
        assert_eq!(a.professor_notes.as_deref(), Some("Too early"));
        assert_eq!(f.seats(&p).await, (0, 3));

        let err = l
            .decide(f.professor, a.id, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(Conflict::InvalidTransition {
                from: ApplicationStatus::Rejected,
                transition: Transition::Accept
            })
        ));
        assert_eq!(f.seats(&p).await, (0, 3));
    }

    #[tokio::test]
    async fn test_submit_preconditions() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 1).await;
        let s = f.students[0];
        let l = f.lifecycle();

        let late = f
            .project(NewProject {
                application_deadline: Some(Utc::now() - Duration::days(1)),
                ..new_project("Expired call", 1)
            })
            .await;
        let err = l.submit(s, &letter(&late)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::DeadlinePassed)));

        let paused = f
            .project(NewProject {
                status: ProjectStatus::Paused,
                ..new_project("On hold", 1)
            })
            .await;
        let err = l.submit(s, &letter(&paused)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(Conflict::NotAcceptingApplications)
        ));

        let mut missing = letter(&paused);
        missing.project_id = ProjectId(4242);
        let err = l.submit(s, &missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("project")));

        let open = f.project(new_project("Open call", 1)).await;
        l.submit(s, &letter(&open)).await.unwrap();
        let err = l.submit(s, &letter(&open)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::AlreadyApplied)));

        assert!(l.applications_for_student(s).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_ownership() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 2).await;
        let p = f.project(new_project("Art of programming", 2)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p)).await.unwrap();

        let other = users::register(
            f.store.pool(),
            &new_user("Robert Tarjan", Role::Professor, "Computer Science"),
            "other",
            Utc::now(),
        )
        .await
        .unwrap()
        .id;
        let err = l
            .decide(other, a.id, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = l.withdraw(f.students[1], a.id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = l
            .decide(f.professor, ApplicationId(999), Decision::Reject, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("application")));
        assert_eq!(f.seats(&p).await, (0, 2));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 3).await;
        let p = f.project(new_project("Surreal numbers", 3)).await;
        let l = f.lifecycle();
        let pending = l.submit(f.students[0], &letter(&p)).await.unwrap();
        let accepted = l.submit(f.students[1], &letter(&p)).await.unwrap();
        let rejected = l.submit(f.students[2], &letter(&p)).await.unwrap();
        l.decide(f.professor, accepted.id, Decision::Accept, None)
            .await
            .unwrap();
        l.decide(f.professor, rejected.id, Decision::Reject, None)
            .await
            .unwrap();
        assert_eq!(f.seats(&p).await, (1, 3));

        l.withdraw(f.students[0], pending.id).await.unwrap();
        assert_eq!(f.seats(&p).await, (1, 3));
        let withdrawn = applications::find(f.store.pool(), pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);

        for (student, id, from) in [
            (f.students[1], accepted.id, ApplicationStatus::Accepted),
            (f.students[2], rejected.id, ApplicationStatus::Rejected),
            (f.students[0], pending.id, ApplicationStatus::Withdrawn),
        ] {
            let err = l.withdraw(student, id).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Conflict(Conflict::InvalidTransition { from: actual, .. }) if actual == from
            ));
        }
        assert_eq!(f.seats(&p).await, (1, 3));
        assert!(l.is_consistent(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_listings_newest_first() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 2).await;
        let p1 = f.project(new_project("First project", 2)).await;
        let p2 = f.project(new_project("Second project", 2)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p1)).await.unwrap();
        let b = l.submit(f.students[0], &letter(&p2)).await.unwrap();
        let c = l.submit(f.students[1], &letter(&p1)).await.unwrap();

        let mine = l.applications_for_student(f.students[0]).await.unwrap();
        let ids = mine.iter().map(|d| d.application.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![b.id, a.id]);
        assert_eq!(mine[0].project.title, "Second project");

        let theirs = l.applications_for_professor(f.professor).await.unwrap();
        let ids = theirs.iter().map(|d| d.application.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
        assert!(l.applications_for_professor(f.students[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 1).await;
        let p = f.project(new_project("Short lived", 1)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p)).await.unwrap();
        let mut conn = f.store.pool().acquire().await.unwrap();
        assert!(projects::delete(&mut conn, p.id).await.unwrap());
        drop(conn);
        assert!(applications::find(f.store.pool(), a.id).await.unwrap().is_none());
        assert!(l.applications_for_student(f.students[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pause_blocks_new_applications_only() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 2).await;
        let p = f.project(new_project("Pausable", 2)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p)).await.unwrap();
        let mut conn = f.store.pool().acquire().await.unwrap();
        projects::update(
            &mut conn,
            p.id,
            &ProjectUpdate {
                status: Some(ProjectStatus::Paused),
                ..ProjectUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        drop(conn);
        let err = l.submit(f.students[1], &letter(&p)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(Conflict::NotAcceptingApplications)
        ));
        l.decide(f.professor, a.id, Decision::Accept, None)
            .await
            .unwrap();
        assert_eq!(f.seats(&p).await, (1, 2));
    }

    #[tokio::test]
    async fn test_lost_race_reports_current_state() {
        let f = Fixture::new(Store::in_memory().await.unwrap(), 2).await;
        let p = f.project(new_project("Vanishing project", 2)).await;
        let l = f.lifecycle();
        let a = l.submit(f.students[0], &letter(&p)).await.unwrap();
        let b = l.submit(f.students[1], &letter(&p)).await.unwrap();
        l.withdraw(f.students[0], a.id).await.unwrap();
        let err = lost_race(f.store.pool(), a.id, Transition::Accept).await;
        assert!(matches!(
            err,
            Error::Conflict(Conflict::InvalidTransition {
                from: ApplicationStatus::Withdrawn,
                transition: Transition::Accept
            })
        ));

        let mut conn = f.store.pool().acquire().await.unwrap();
        assert!(projects::delete(&mut conn, p.id).await.unwrap());
        drop(conn);
        let err = lost_race(f.store.pool(), b.id, Transition::Accept).await;
        assert!(matches!(err, Error::NotFound("application")));
        let err = l
            .decide(f.professor, b.id, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("application")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_of_one_student() {
        let path = std::env::temp_dir().join(format!(
            "research-match-submit-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let url = format!("sqlite://{}", path.display());
        let store = Store::connect(&url, 4).await.unwrap();
        let f = Fixture::new(store.clone(), 1).await;
        let p = f.project(new_project("Popular topic", 3)).await;
        let student = f.students[0];

        let contenders = 8;
        let mut tasks = JoinSet::new();
        for _ in 0..contenders {
            let store = f.store.clone();
            let application = letter(&p);
            tasks.spawn(async move {
                Lifecycle::new(&store)
                    .submit(student, &application)
                    .await
            });
        }
        let (mut submitted, mut refused) = (0, 0);
        while let Some(outcome) = tasks.join_next().await {
            match outcome.unwrap() {
                Ok(a) => {
                    assert_eq!(a.status, ApplicationStatus::Pending);
                    submitted += 1;
                }
                Err(Error::Conflict(Conflict::AlreadyApplied)) => refused += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((submitted, refused), (1, contenders - 1));
        let l = f.lifecycle();
        assert_eq!(l.applications_for_student(student).await.unwrap().len(), 1);

        store.pool().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    async fn race_for_last_seat(store: Store, contenders: usize) {
        let f = Fixture::new(store, contenders).await;
        let p = f.project(new_project("Last seat", 2)).await;
        let l = f.lifecycle();
        let mut ids = Vec::new();
        for &s in &f.students {
            ids.push(l.submit(s, &letter(&p)).await.unwrap().id);
        }
        // Leave a single seat open.
        let first = ids.remove(0);
        l.decide(f.professor, first, Decision::Accept, None)
            .await
            .unwrap();

        let mut tasks = JoinSet::new();
        for id in ids {
            let store = f.store.clone();
            let professor = f.professor;
            tasks.spawn(async move {
                Lifecycle::new(&store)
                    .decide(professor, id, Decision::Accept, None)
                    .await
            });
        }
        let (mut accepted, mut full) = (0, 0);
        while let Some(outcome) = tasks.join_next().await {
            match outcome.unwrap() {
                Ok(a) => {
                    assert_eq!(a.status, ApplicationStatus::Accepted);
                    accepted += 1;
                }
                Err(Error::Conflict(Conflict::AtCapacity)) => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((accepted, full), (1, contenders - 2));
        assert_eq!(f.seats(&p).await, (2, 2));
        assert!(l.is_consistent(p.id).await.unwrap());
        let pending = applications::for_professor(f.store.pool(), f.professor)
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.application.status == ApplicationStatus::Pending)
            .count();
        assert_eq!(pending, contenders - 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_in_memory() {
        race_for_last_seat(Store::in_memory().await.unwrap(), 8).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_on_disk() {
        let path = std::env::temp_dir().join(format!(
            "research-match-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let url = format!("sqlite://{}", path.display());
        let store = Store::connect(&url, 4).await.unwrap();
        race_for_last_seat(store.clone(), 8).await;
        store.pool().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
