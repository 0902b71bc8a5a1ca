//! Directory collaborators: subjects (login accounts), students and scenarios.
//!
//! The core consumes these through narrow traits: subject existence and soft-delete for
//! principal resolution, ownership facts for the permission policy, and the scenario
//! catalog for session snapshots and grading. `MemoryDirectory` implements all three and
//! can be filled from a JSON seed file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::identity::{hash_password, ResourceOwnership, ResourceType, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub org_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SubjectRecord {
    pub fn is_active(&self) -> bool { self.deleted_at.is_none() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: i64,
    pub name: String,
    /// Teacher that owns this student.
    pub owner_id: i64,
    pub org_id: i64,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// How a question is graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerKey {
    /// 1-based option numbers.
    Choice { correct_option: u32, option_count: u32 },
    /// Spoken answer; similarity against this text is scored by the speech service.
    Audio { expected_transcript: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionKey {
    pub id: i64,
    pub seq_no: u32,
    #[serde(default)]
    pub prompt: String,
    pub answer: AnswerKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub difficulty: String,
    pub owner_id: i64,
    pub org_id: i64,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: Vec<QuestionKey>,
}

impl ScenarioRecord {
    pub fn question(&self, question_id: i64) -> Option<&QuestionKey> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// Account fields supplied at registration. The directory assigns the id.
#[derive(Debug, Clone)]
pub struct NewSubject {
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub org_id: Option<i64>,
}

/// Subject lookups. Soft-deleted subjects are invisible to every lookup.
pub trait SubjectDirectory: Send + Sync {
    fn subject(&self, id: i64) -> Option<SubjectRecord>;
    fn subject_by_username(&self, username: &str) -> Option<SubjectRecord>;
    /// Register an account. Fails with `ValidationFailed` if an active subject already
    /// holds the username.
    fn create_subject(&self, new: NewSubject) -> AppResult<SubjectRecord>;
    fn soft_delete_subject(&self, id: i64, at: DateTime<Utc>) -> AppResult<()>;
}

/// Ownership facts for directory-held resources (students, scenarios).
pub trait OwnershipDirectory: Send + Sync {
    fn ownership(&self, resource_type: ResourceType, id: i64) -> Option<ResourceOwnership>;
}

pub trait ScenarioCatalog: Send + Sync {
    /// Live (not soft-deleted) scenario.
    fn scenario(&self, id: i64) -> Option<ScenarioRecord>;
}

#[derive(Debug, Deserialize)]
struct SeedSubject {
    id: i64,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    password: String,
    role: Role,
    #[serde(default)]
    org_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedFile {
    subjects: Vec<SeedSubject>,
    students: Vec<StudentRecord>,
    scenarios: Vec<ScenarioRecord>,
}

#[derive(Default)]
struct Inner {
    subjects: HashMap<i64, SubjectRecord>,
    students: HashMap<i64, StudentRecord>,
    scenarios: HashMap<i64, ScenarioRecord>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn insert_subject(&self, record: SubjectRecord) { self.inner.write().subjects.insert(record.id, record); }
    pub fn insert_student(&self, record: StudentRecord) { self.inner.write().students.insert(record.id, record); }
    pub fn insert_scenario(&self, record: ScenarioRecord) { self.inner.write().scenarios.insert(record.id, record); }

    /// Create an account with a hashed password. Usernames are unique among active subjects.
    pub fn add_subject(
        &self,
        id: i64,
        username: &str,
        display_name: &str,
        password: &str,
        role: Role,
        org_id: Option<i64>,
    ) -> AppResult<SubjectRecord> {
        let new = NewSubject {
            username: username.to_string(),
            display_name: display_name.to_string(),
            password_hash: hash_password(password)?,
            role,
            org_id,
        };
        self.insert_unique(Some(id), new)
    }

    /// Uniqueness check and insert under one write lock. `None` takes the next free id.
    fn insert_unique(&self, id: Option<i64>, new: NewSubject) -> AppResult<SubjectRecord> {
        let mut w = self.inner.write();
        if w.subjects.values().any(|s| s.is_active() && s.username == new.username) {
            return Err(AppError::invalid(format!("username '{}' already taken", new.username)));
        }
        let id = id.unwrap_or_else(|| w.subjects.keys().max().map_or(1, |max| max + 1));
        let record = SubjectRecord {
            id,
            username: new.username,
            display_name: new.display_name,
            password_hash: new.password_hash,
            role: new.role,
            org_id: new.org_id,
            deleted_at: None,
        };
        w.subjects.insert(id, record.clone());
        Ok(record)
    }

    pub fn subject_count(&self) -> usize { self.inner.read().subjects.len() }

    /// Seed an ADMIN `admin` account when the directory holds no subjects at all.
    pub fn ensure_default_admin(&self, password: &str) -> AppResult<bool> {
        if self.subject_count() > 0 {
            return Ok(false);
        }
        self.add_subject(1, "admin", "Administrator", password, Role::Admin, None)?;
        info!(target: "startup", "seeded default admin account");
        Ok(true)
    }

    /// Load subjects, students and scenarios from a JSON seed file. Seed passwords are
    /// plaintext and hashed on load.
    pub fn load_seed(&self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))?;
        let (n_subj, n_stu, n_scn) = (seed.subjects.len(), seed.students.len(), seed.scenarios.len());
        for s in seed.subjects {
            let display = s.display_name.unwrap_or_else(|| s.username.clone());
            self.add_subject(s.id, &s.username, &display, &s.password, s.role, s.org_id)?;
        }
        for st in seed.students {
            self.insert_student(st);
        }
        for sc in seed.scenarios {
            self.insert_scenario(sc);
        }
        info!(target: "startup", subjects = n_subj, students = n_stu, scenarios = n_scn, "seed loaded from {}", path.display());
        Ok(())
    }
}

impl SubjectDirectory for MemoryDirectory {
    fn subject(&self, id: i64) -> Option<SubjectRecord> {
        self.inner.read().subjects.get(&id).filter(|s| s.is_active()).cloned()
    }

    fn subject_by_username(&self, username: &str) -> Option<SubjectRecord> {
        self.inner.read().subjects.values().find(|s| s.is_active() && s.username == username).cloned()
    }

    fn create_subject(&self, new: NewSubject) -> AppResult<SubjectRecord> {
        let record = self.insert_unique(None, new)?;
        info!(target: "practicum::auth", subject = record.id, username = %record.username, "subject registered");
        Ok(record)
    }

    fn soft_delete_subject(&self, id: i64, at: DateTime<Utc>) -> AppResult<()> {
        let mut w = self.inner.write();
        match w.subjects.get_mut(&id) {
            Some(s) if s.is_active() => {
                s.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(AppError::SubjectNotFound(id.to_string())),
        }
    }
}

impl OwnershipDirectory for MemoryDirectory {
    fn ownership(&self, resource_type: ResourceType, id: i64) -> Option<ResourceOwnership> {
        let r = self.inner.read();
        let (owner_id, org_id) = match resource_type {
            ResourceType::Student => r.students.get(&id).filter(|s| s.deleted_at.is_none()).map(|s| (s.owner_id, s.org_id))?,
            ResourceType::Scenario => r.scenarios.get(&id).filter(|s| s.deleted_at.is_none()).map(|s| (s.owner_id, s.org_id))?,
            ResourceType::Session => return None,
        };
        Some(ResourceOwnership { resource_type, resource_id: id, owner_id, org_id })
    }
}

impl ScenarioCatalog for MemoryDirectory {
    fn scenario(&self, id: i64) -> Option<ScenarioRecord> {
        self.inner.read().scenarios.get(&id).filter(|s| s.deleted_at.is_none()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn soft_deleted_subject_is_invisible() {
        let dir = MemoryDirectory::new();
        dir.add_subject(2, "kim", "Kim", "pw", Role::Teacher, Some(1)).unwrap();
        assert!(dir.subject(2).is_some());
        dir.soft_delete_subject(2, Utc::now()).unwrap();
        assert!(dir.subject(2).is_none());
        assert!(dir.subject_by_username("kim").is_none());
        assert_eq!(dir.soft_delete_subject(2, Utc::now()), Err(AppError::SubjectNotFound("2".into())));
        // the username is free again once the old account is withdrawn
        assert!(dir.add_subject(3, "kim", "Kim", "pw", Role::Teacher, Some(1)).is_ok());
    }

    #[test]
    fn duplicate_username_rejected() {
        let dir = MemoryDirectory::new();
        dir.add_subject(2, "kim", "Kim", "pw", Role::Teacher, None).unwrap();
        assert!(matches!(dir.add_subject(3, "kim", "K", "pw", Role::Teacher, None), Err(AppError::ValidationFailed(_))));
    }

    #[test]
    fn created_subjects_get_the_next_free_id() {
        let dir = MemoryDirectory::new();
        let new = |username: &str| NewSubject {
            username: username.into(),
            display_name: username.into(),
            password_hash: "h".into(),
            role: Role::Teacher,
            org_id: Some(1),
        };
        assert_eq!(dir.create_subject(new("a")).unwrap().id, 1);
        dir.add_subject(9, "kim", "Kim", "pw", Role::Teacher, None).unwrap();
        assert_eq!(dir.create_subject(new("b")).unwrap().id, 10);
        assert!(matches!(dir.create_subject(new("kim")), Err(AppError::ValidationFailed(_))));
        assert_eq!(dir.subject_count(), 3);
    }

    #[test]
    fn ownership_facts_skip_deleted_and_sessions() {
        let dir = MemoryDirectory::new();
        dir.insert_student(StudentRecord { id: 4, name: "S".into(), owner_id: 2, org_id: 1, deleted_at: None });
        dir.insert_student(StudentRecord { id: 5, name: "gone".into(), owner_id: 2, org_id: 1, deleted_at: Some(Utc::now()) });
        let o = dir.ownership(ResourceType::Student, 4).unwrap();
        assert_eq!((o.owner_id, o.org_id, o.resource_id), (2, 1, 4));
        assert!(dir.ownership(ResourceType::Student, 5).is_none());
        assert!(dir.ownership(ResourceType::Session, 4).is_none());
    }

    #[test]
    fn default_admin_only_when_empty() {
        let dir = MemoryDirectory::new();
        assert!(dir.ensure_default_admin("pw").unwrap());
        assert!(!dir.ensure_default_admin("pw").unwrap());
        assert_eq!(dir.subject_by_username("admin").unwrap().role, Role::Admin);
    }

    #[test]
    fn loads_seed_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{
                "subjects": [{{"id": 2, "username": "kim", "password": "pw", "role": "TEACHER", "org_id": 1}}],
                "students": [{{"id": 4, "name": "S", "owner_id": 2, "org_id": 1}}],
                "scenarios": [{{"id": 7, "title": "Cafe", "difficulty": "EASY", "owner_id": 2, "org_id": 1,
                    "questions": [
                        {{"id": 1, "seq_no": 1, "answer": {{"kind": "choice", "correct_option": 2, "option_count": 4}}}},
                        {{"id": 2, "seq_no": 2, "answer": {{"kind": "audio", "expected_transcript": "hello"}}}}
                    ]}}]
            }}"#
        )
        .unwrap();
        let dir = MemoryDirectory::new();
        dir.load_seed(f.path()).unwrap();
        let kim = dir.subject_by_username("kim").unwrap();
        assert_eq!(kim.display_name, "kim");
        assert!(crate::identity::verify_password(&kim.password_hash, "pw"));
        let sc = dir.scenario(7).unwrap();
        assert_eq!(sc.questions.len(), 2);
        assert!(matches!(sc.question(2).unwrap().answer, AnswerKey::Audio { .. }));
        assert!(dir.ownership(ResourceType::Student, 4).is_some());
    }

    #[test]
    fn bad_seed_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        assert!(MemoryDirectory::new().load_seed(f.path()).is_err());
        assert!(MemoryDirectory::new().load_seed(Path::new("/definitely/missing.json")).is_err());
    }
}
