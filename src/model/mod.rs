pub use self::application::{
    Application, ApplicationDetails, ApplicationId, ApplicationStatus, Decision, NewApplication,
    Transition,
};
pub use self::project::{
    Capacity, NewProject, Project, ProjectDetails, ProjectId, ProjectPage, ProjectQuery,
    ProjectStatus, ProjectSummary, ProjectUpdate, Requirements,
};
pub use self::user::{
    Credentials, NewUser, ProfileUpdate, Role, User, UserId, UserSummary, Year,
};

mod application;
mod project;
mod user;
