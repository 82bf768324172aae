//! PostgreSQL implementation of [`BuildRepo`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cibox_core::vcs::CommitInfo;
use cibox_core::{Build, Command, CommandResult, Project, ResourceId, Status};
use sqlx::PgPool;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{BuildRepo, NewProject, unique_log_name};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRecord {
    id: uuid::Uuid,
    name: String,
    folder_path: String,
    branch: String,
    remote: String,
    created_at: DateTime<Utc>,
}

impl From<ProjectRecord> for Project {
    fn from(r: ProjectRecord) -> Self {
        Project {
            id: r.id.into(),
            name: r.name,
            folder_path: PathBuf::from(r.folder_path),
            branch: r.branch,
            remote: r.remote,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CommandRecord {
    id: uuid::Uuid,
    project_id: uuid::Uuid,
    name: String,
    command: String,
    position: i32,
}

impl From<CommandRecord> for Command {
    fn from(r: CommandRecord) -> Self {
        Command {
            id: r.id.into(),
            project_id: r.project_id.into(),
            name: r.name,
            command: r.command,
            position: r.position,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildRecord {
    id: uuid::Uuid,
    project_id: uuid::Uuid,
    commit_hash: Option<String>,
    commit_message: Option<String>,
    commit_author: Option<String>,
    commit_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl BuildRecord {
    fn into_build(self, results: Vec<CommandResult>) -> Build {
        Build {
            id: self.id.into(),
            project_id: self.project_id.into(),
            commit_hash: self.commit_hash,
            commit_message: self.commit_message,
            commit_author: self.commit_author,
            commit_date: self.commit_date,
            created_at: self.created_at,
            results,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ResultRecord {
    id: uuid::Uuid,
    build_id: uuid::Uuid,
    command_id: uuid::Uuid,
    command_name: String,
    status: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    log_path: String,
}

impl TryFrom<ResultRecord> for CommandResult {
    type Error = DbError;

    fn try_from(r: ResultRecord) -> DbResult<Self> {
        let status: Status = r
            .status
            .parse()
            .map_err(|e| DbError::Corrupt(format!("result {}: {}", r.id, e)))?;
        Ok(CommandResult::restore(
            r.id.into(),
            r.build_id.into(),
            r.command_id.into(),
            r.command_name,
            status,
            r.start_time,
            r.end_time,
            PathBuf::from(r.log_path),
        ))
    }
}

fn into_results(records: Vec<ResultRecord>) -> DbResult<Vec<CommandResult>> {
    records.into_iter().map(CommandResult::try_from).collect()
}

const RESULT_COLUMNS: &str =
    "id, build_id, command_id, command_name, status, start_time, end_time, log_path";

/// PostgreSQL implementation of BuildRepo.
pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn results_ordered(
        &self,
        build_id: ResourceId,
        order_by: &str,
    ) -> DbResult<Vec<CommandResult>> {
        let records = sqlx::query_as::<_, ResultRecord>(&format!(
            "SELECT {} FROM results WHERE build_id = $1 ORDER BY {}",
            RESULT_COLUMNS, order_by
        ))
        .bind(build_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        into_results(records)
    }
}

#[async_trait]
impl BuildRepo for PgBuildRepo {
    async fn create_project(&self, project: NewProject) -> DbResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            r#"
            INSERT INTO projects (id, name, folder_path, branch, remote, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&project.name)
        .bind(project.folder_path.to_string_lossy().as_ref())
        .bind(&project.branch)
        .bind(&project.remote)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("project {}", project.name))
            }
            other => DbError::Database(other),
        })?;
        Ok(record.into())
    }

    async fn get_project(&self, id: ResourceId) -> DbResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))?;
        Ok(record.into())
    }

    async fn find_project_by_name(&self, name: &str) -> DbResult<Option<Project>> {
        let record =
            sqlx::query_as::<_, ProjectRecord>("SELECT * FROM projects WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record.map(Project::from))
    }

    async fn add_command(
        &self,
        project_id: ResourceId,
        name: &str,
        command: &str,
    ) -> DbResult<Command> {
        let existing = self.list_commands(project_id).await?;
        unique_log_name(&existing, name)?;

        let record = sqlx::query_as::<_, CommandRecord>(
            r#"
            INSERT INTO commands (id, project_id, name, command, position)
            VALUES ($1, $2, $3, $4, (SELECT COALESCE(MAX(position) + 1, 0) FROM commands WHERE project_id = $2))
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(project_id.as_uuid())
        .bind(name)
        .bind(command)
        .fetch_one(&self.pool)
        .await?;
        Ok(record.into())
    }

    async fn list_commands(&self, project_id: ResourceId) -> DbResult<Vec<Command>> {
        let records = sqlx::query_as::<_, CommandRecord>(
            "SELECT * FROM commands WHERE project_id = $1 ORDER BY position",
        )
        .bind(project_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Command::from).collect())
    }

    async fn insert_build(&self, build: &Build) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO builds (id, project_id, commit_hash, commit_message, commit_author, commit_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(build.id.as_uuid())
        .bind(build.project_id.as_uuid())
        .bind(&build.commit_hash)
        .bind(&build.commit_message)
        .bind(&build.commit_author)
        .bind(build.commit_date)
        .bind(build.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, result) in build.results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO results (id, build_id, command_id, command_name, position, status, start_time, end_time, log_path)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(result.id.as_uuid())
            .bind(build.id.as_uuid())
            .bind(result.command_id.as_uuid())
            .bind(&result.command_name)
            .bind(position as i32)
            .bind(result.status().as_str())
            .bind(result.start_time)
            .bind(result.end_time)
            .bind(result.log_path.to_string_lossy().as_ref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_build(&self, id: ResourceId) -> DbResult<Build> {
        let record = sqlx::query_as::<_, BuildRecord>("SELECT * FROM builds WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;

        let results = self.results_ordered(id, "position ASC").await?;
        Ok(record.into_build(results))
    }

    async fn list_builds(&self, project_id: ResourceId, limit: i64) -> DbResult<Vec<Build>> {
        let records = sqlx::query_as::<_, BuildRecord>(
            "SELECT * FROM builds WHERE project_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(project_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<uuid::Uuid> = records.iter().map(|r| r.id).collect();
        let result_records = sqlx::query_as::<_, ResultRecord>(&format!(
            "SELECT {} FROM results WHERE build_id = ANY($1) ORDER BY build_id, position",
            RESULT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_build: HashMap<uuid::Uuid, Vec<CommandResult>> = HashMap::new();
        for record in result_records {
            let build_id = record.build_id;
            by_build
                .entry(build_id)
                .or_default()
                .push(CommandResult::try_from(record)?);
        }

        Ok(records
            .into_iter()
            .map(|r| {
                let results = by_build.remove(&r.id).unwrap_or_default();
                r.into_build(results)
            })
            .collect())
    }

    async fn update_build_commit(&self, id: ResourceId, commit: &CommitInfo) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE builds
            SET commit_hash = $2, commit_message = $3, commit_author = $4, commit_date = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&commit.hash)
        .bind(&commit.message)
        .bind(&commit.author)
        .bind(commit.date)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("build {}", id)));
        }
        Ok(())
    }

    async fn update_result(&self, result: &CommandResult) -> DbResult<()> {
        let updated = sqlx::query(
            "UPDATE results SET status = $2, start_time = $3, end_time = $4 WHERE id = $1",
        )
        .bind(result.id.as_uuid())
        .bind(result.status().as_str())
        .bind(result.start_time)
        .bind(result.end_time)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("result {}", result.id)));
        }
        Ok(())
    }

    async fn results_recent_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>> {
        self.results_ordered(build_id, "end_time DESC NULLS LAST, position ASC")
            .await
    }

    async fn results_oldest_first(&self, build_id: ResourceId) -> DbResult<Vec<CommandResult>> {
        self.results_ordered(build_id, "start_time ASC NULLS LAST, position ASC")
            .await
    }
}
