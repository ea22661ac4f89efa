use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;

use crate::storage::traits::Storage;
use crate::types::{AgentFilter, AgentId, AgentRecord, Edge, Event, EventId, EventQuery};

const AGENT_COLUMNS: &str = "id, name, kind, is_active, last_run, next_run, interval_secs, config, \
     can_receive_events, can_generate_events, is_running, created_at";

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__initial_schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create_agent(&self, agent: &AgentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, name, kind, is_active, last_run, next_run, interval_secs, config,
                can_receive_events, can_generate_events, is_running, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(&agent.kind)
        .bind(agent.is_active)
        .bind(agent.last_run)
        .bind(agent.next_run)
        .bind(agent.interval_secs)
        .bind(&agent.config)
        .bind(agent.can_receive_events)
        .bind(agent.can_generate_events)
        .bind(agent.is_running)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = $1", AGENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn get_agents(&self, ids: &[AgentId]) -> Result<Vec<Option<AgentRecord>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE id = ANY($1)",
            AGENT_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let found: HashMap<AgentId, AgentRecord> = rows
            .iter()
            .map(|r| row_to_agent(r).map(|a| (a.id, a)))
            .collect::<Result<_>>()?;

        Ok(ids
            .iter()
            .map(|id| found.get(id).cloned())
            .collect())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM agents WHERE TRUE",
            AGENT_COLUMNS
        ));
        if filter.active_only {
            builder.push(" AND is_active = TRUE");
        }
        if let Some(kind) = &filter.kind {
            builder.push(" AND kind = ").push_bind(kind.clone());
        }
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        builder.push(" ORDER BY created_at ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn due_agents(&self, now: DateTime<Utc>) -> Result<Vec<AgentRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM agents
            WHERE is_active = TRUE AND is_running = FALSE AND next_run <= $1
            ORDER BY next_run ASC
            "#,
            AGENT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_agent).collect()
    }

    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_agent_schedule(
        &self,
        id: AgentId,
        interval_secs: Option<i64>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE agents SET interval_secs = $2, next_run = $3 WHERE id = $1")
                .bind(id)
                .bind(interval_secs)
                .bind(next_run)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_agent(&self, id: AgentId) -> Result<bool> {
        let row = sqlx::query(
            r#"
            UPDATE agents
            SET is_running = TRUE
            WHERE id = $1 AND is_active = TRUE AND is_running = FALSE
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn release_agent(
        &self,
        id: AgentId,
        last_run: DateTime<Utc>,
        reschedule: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE agents
            SET is_running = FALSE,
                last_run = $2,
                next_run = CASE
                    WHEN $3 AND interval_secs IS NOT NULL
                        THEN $2 + interval_secs * INTERVAL '1 second'
                    WHEN $3 THEN NULL
                    ELSE next_run
                END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_run)
        .bind(reschedule)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Cannot release missing agent {}", id));
        }
        Ok(())
    }

    async fn create_edges(&self, edges: &[Edge]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO source_agents (agent_id, source_id) ");
        builder.push_values(edges, |mut b, edge| {
            b.push_bind(edge.agent).push_bind(edge.source);
        });
        builder.push(" ON CONFLICT DO NOTHING");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn listeners_of(&self, source: AgentId) -> Result<Vec<AgentId>> {
        let rows = sqlx::query("SELECT agent_id FROM source_agents WHERE source_id = $1")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get("agent_id").map_err(Into::into))
            .collect()
    }

    async fn sources_of(&self, agent: AgentId) -> Result<Vec<AgentId>> {
        let rows = sqlx::query("SELECT source_id FROM source_agents WHERE agent_id = $1")
            .bind(agent)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get("source_id").map_err(Into::into))
            .collect()
    }

    async fn create_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO events (id, data, source_id, target_id, is_done, created_at) ",
        );
        builder.push_values(events, |mut b, event| {
            b.push_bind(event.id)
                .push_bind(event.data.clone())
                .push_bind(event.source)
                .push_bind(event.target)
                .push_bind(event.is_done)
                .push_bind(event.created_at);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, data, source_id, target_id, is_done, created_at FROM events WHERE TRUE",
        );
        if !query.include_done {
            builder.push(" AND is_done = FALSE");
        }
        if let Some(target) = query.target {
            builder.push(" AND target_id = ").push_bind(target);
        }
        if let Some(source) = query.source {
            builder.push(" AND source_id = ").push_bind(source);
        }
        if let Some(sources) = &query.sources {
            if sources.is_empty() {
                builder.push(" AND FALSE");
            } else {
                builder
                    .push(" AND source_id = ANY(")
                    .push_bind(sources.clone())
                    .push(")");
            }
        }
        builder.push(" ORDER BY created_at ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn mark_events_done(&self, ids: &[EventId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE events SET is_done = TRUE WHERE id = ANY($1) AND is_done = FALSE")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_agent(r: &sqlx::postgres::PgRow) -> Result<AgentRecord> {
    Ok(AgentRecord {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        kind: r.try_get("kind")?,
        is_active: r.try_get("is_active")?,
        last_run: r.try_get("last_run")?,
        next_run: r.try_get("next_run")?,
        interval_secs: r.try_get("interval_secs")?,
        config: r.try_get("config")?,
        can_receive_events: r.try_get("can_receive_events")?,
        can_generate_events: r.try_get("can_generate_events")?,
        is_running: r.try_get("is_running")?,
        created_at: r.try_get("created_at")?,
    })
}

fn row_to_event(r: &sqlx::postgres::PgRow) -> Result<Event> {
    Ok(Event {
        id: r.try_get("id")?,
        data: r.try_get("data")?,
        source: r.try_get("source_id")?,
        target: r.try_get("target_id")?,
        is_done: r.try_get("is_done")?,
        created_at: r.try_get("created_at")?,
    })
}
