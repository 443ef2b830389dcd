//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite storage for the engine featuring:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - Version-tracked migrations
//! - WAL mode for optimal read/write performance
//!
//! Row access is owner-scoped wherever a caller identity applies; callers
//! never see another tenant's rows through this layer.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Row, params};

use crate::types::{
    Conversation, ConversationMessage, EngineError, Entity, EntityStatus, GenerationKind,
    GenerationRecord, Insight, InsightKind, MessageRole, OwnerId, PromptTemplate, Result,
    ResultExt, TemplateVisibility, UsageCategory, UsageStat,
};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 2;

/// Migration definitions
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Add api_base column to provider settings",
        up: "ALTER TABLE provider_settings ADD COLUMN api_base TEXT",
    },
    Migration {
        version: 2,
        description: "Add per-category usage sub-totals",
        up: "ALTER TABLE usage_stats ADD COLUMN generation_tokens INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE usage_stats ADD COLUMN chat_tokens INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE usage_stats ADD COLUMN analysis_tokens INTEGER NOT NULL DEFAULT 0",
    },
];

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    /// Minimum pool size regardless of CPU count
    const MIN_POOL_SIZE: u32 = 4;
    /// Maximum pool size regardless of CPU count
    const MAX_POOL_SIZE: u32 = 32;

    /// Calculate pool size from available CPU cores: clamp(cores * 2, MIN, MAX).
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        (cores * 2).clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    /// Create config with automatic pool sizing based on CPU cores
    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(2),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| {
                EngineError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| {
            EngineError::Storage(format!("Failed to create in-memory pool: {}", e))
        })?;

        Ok(Self { pool })
    }

    /// Configure a new connection with production-ready settings.
    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 5000;
            PRAGMA wal_autocheckpoint = 1000;
            "#,
        )?;
        Ok(())
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            EngineError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        let fresh: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name = 'provider_settings'",
                [],
                |row| row.get(0),
            )
            .with_context("Failed to inspect schema state")?;

        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;

        if fresh == 0 {
            // Fresh schema already includes every migrated column
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to set schema version")?;
        }

        drop(conn);
        // Migrations only apply to existing databases with older versions
        self.migrate()?;
        Ok(())
    }

    /// Run version-tracked migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }

    /// Get a raw connection for advanced operations.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.conn()
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// All operations within the closure are atomic. If the closure panics,
    /// the transaction is automatically rolled back and an error is returned
    /// instead of poisoning the connection pool.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + std::panic::UnwindSafe,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(e)) => {
                // Transaction rolled back on drop
                Err(e)
            }
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());

                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(EngineError::Storage(format!(
                    "Transaction panicked: {}",
                    panic_msg
                )))
            }
        }
    }

    // =========================================================================
    // Provider Settings
    // =========================================================================

    /// Replace the owner's provider settings, preserving `created_at` when a
    /// previous row exists.
    pub fn upsert_provider_settings(&self, settings: &crate::vault::ProviderSettings) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO provider_settings
                 (owner_id, encrypted_credential, api_base, model, temperature,
                  max_output_tokens, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(owner_id) DO UPDATE SET
                     encrypted_credential = excluded.encrypted_credential,
                     api_base = excluded.api_base,
                     model = excluded.model,
                     temperature = excluded.temperature,
                     max_output_tokens = excluded.max_output_tokens,
                     active = excluded.active,
                     updated_at = excluded.updated_at",
                params![
                    settings.owner_id.as_str(),
                    settings.encrypted_credential,
                    settings.api_base,
                    settings.model,
                    settings.temperature as f64,
                    settings.max_output_tokens as i64,
                    settings.active,
                    settings.created_at.to_rfc3339(),
                    settings.updated_at.to_rfc3339(),
                ],
            )
            .with_context("Failed to store provider settings")?;
        Ok(())
    }

    /// Load the owner's provider settings, if any.
    pub fn get_provider_settings(
        &self,
        owner: &OwnerId,
    ) -> Result<Option<crate::vault::ProviderSettings>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT owner_id, encrypted_credential, api_base, model, temperature,
                    max_output_tokens, active, created_at, updated_at
             FROM provider_settings WHERE owner_id = ?1",
        )?;

        let result = stmt.query_row(params![owner.as_str()], |row| {
            Ok(crate::vault::ProviderSettings {
                owner_id: OwnerId::new(row.get::<_, String>(0)?),
                encrypted_credential: row.get(1)?,
                api_base: row.get(2)?,
                model: row.get(3)?,
                temperature: row.get::<_, f64>(4)? as f32,
                max_output_tokens: row.get::<_, i64>(5)? as u32,
                active: row.get(6)?,
                created_at: parse_timestamp(&row.get::<_, String>(7)?),
                updated_at: parse_timestamp(&row.get::<_, String>(8)?),
            })
        });

        match result {
            Ok(settings) => Ok(Some(settings)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Prompt Templates
    // =========================================================================

    pub fn insert_template(&self, template: &PromptTemplate) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO prompt_templates
                 (id, owner_id, name, category, body, visibility, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    template.id,
                    template.owner_id.as_str(),
                    template.name,
                    template.category,
                    template.body,
                    template.visibility.as_str(),
                    template.active,
                    template.created_at.to_rfc3339(),
                    template.updated_at.to_rfc3339(),
                ],
            )
            .with_context("Failed to insert template")?;
        Ok(())
    }

    pub fn get_template(&self, template_id: &str) -> Result<Option<PromptTemplate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, category, body, visibility, active, created_at, updated_at
             FROM prompt_templates WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![template_id], map_template_row);
        match result {
            Ok(template) => Ok(Some(template)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Templates visible to `owner`: their own plus other tenants' active
    /// public ones, newest first.
    pub fn list_templates(
        &self,
        owner: &OwnerId,
        category: Option<&str>,
    ) -> Result<Vec<PromptTemplate>> {
        let conn = self.conn()?;

        let mut stmt = if category.is_some() {
            conn.prepare(
                "SELECT id, owner_id, name, category, body, visibility, active,
                        created_at, updated_at
                 FROM prompt_templates
                 WHERE (owner_id = ?1 OR (visibility = 'public' AND active = 1))
                   AND category = ?2
                 ORDER BY created_at DESC",
            )?
        } else {
            conn.prepare(
                "SELECT id, owner_id, name, category, body, visibility, active,
                        created_at, updated_at
                 FROM prompt_templates
                 WHERE owner_id = ?1 OR (visibility = 'public' AND active = 1)
                 ORDER BY created_at DESC",
            )?
        };

        let templates = if let Some(category) = category {
            stmt.query_map(params![owner.as_str(), category], map_template_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![owner.as_str()], map_template_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(templates)
    }

    pub fn update_template(&self, template: &PromptTemplate) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE prompt_templates
                 SET name = ?1, category = ?2, body = ?3, visibility = ?4,
                     active = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    template.name,
                    template.category,
                    template.body,
                    template.visibility.as_str(),
                    template.active,
                    template.updated_at.to_rfc3339(),
                    template.id,
                ],
            )
            .with_context("Failed to update template")?;
        Ok(())
    }

    // =========================================================================
    // Entities
    // =========================================================================

    pub fn insert_entity(&self, entity: &Entity) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO entities
                 (id, owner_id, name, company, role, industry, location, score,
                  priority, status, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    entity.id,
                    entity.owner_id.as_str(),
                    entity.name,
                    entity.company,
                    entity.role,
                    entity.industry,
                    entity.location,
                    entity.score as i64,
                    entity.priority as i64,
                    entity.status.as_str(),
                    entity.notes,
                    entity.created_at.to_rfc3339(),
                    entity.updated_at.to_rfc3339(),
                ],
            )
            .with_context("Failed to insert entity")?;
        Ok(())
    }

    /// Fetch an entity owned by `owner`. Foreign entities read as absent.
    pub fn get_entity(&self, owner: &OwnerId, entity_id: &str) -> Result<Option<Entity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, company, role, industry, location, score,
                    priority, status, notes, created_at, updated_at
             FROM entities WHERE id = ?1 AND owner_id = ?2",
        )?;

        let result = stmt.query_row(params![entity_id, owner.as_str()], map_entity_row);
        match result {
            Ok(entity) => Ok(Some(entity)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write back an analysis-derived score and priority.
    pub fn apply_entity_score(&self, entity_id: &str, score: u8, priority: u8) -> Result<()> {
        let conn = self.conn()?;
        apply_entity_score(&conn, entity_id, score, priority)
    }

    // =========================================================================
    // Generation Records
    // =========================================================================

    /// Persist a generation record together with its usage increment in one
    /// transaction, so the trace and the meter can never diverge.
    pub fn record_generation(
        &self,
        record: &GenerationRecord,
        category: UsageCategory,
    ) -> Result<()> {
        self.transaction(|conn| {
            insert_generation_record(conn, record)?;
            record_usage(
                conn,
                &record.owner_id,
                record.created_at.date_naive(),
                category,
                record.tokens_used as u64,
                record.cost,
            )
        })
    }

    pub fn get_generation_record(
        &self,
        owner: &OwnerId,
        record_id: &str,
    ) -> Result<Option<GenerationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, entity_id, template_id, kind, input, output,
                    model, tokens_used, cost, parameters, created_at
             FROM generation_records WHERE id = ?1 AND owner_id = ?2",
        )?;

        let result = stmt.query_row(params![record_id, owner.as_str()], map_generation_row);
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The owner's most recent generations, newest first.
    pub fn list_generation_records(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, entity_id, template_id, kind, input, output,
                    model, tokens_used, cost, parameters, created_at
             FROM generation_records
             WHERE owner_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![owner.as_str(), limit as i64], map_generation_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO conversations (id, owner_id, title, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation.id,
                    conversation.owner_id.as_str(),
                    conversation.title,
                    conversation.context,
                    conversation.created_at.to_rfc3339(),
                ],
            )
            .with_context("Failed to insert conversation")?;
        Ok(())
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, context, created_at
             FROM conversations WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![conversation_id], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                owner_id: OwnerId::new(row.get::<_, String>(1)?),
                title: row.get(2)?,
                context: row.get(3)?,
                created_at: parse_timestamp(&row.get::<_, String>(4)?),
            })
        });

        match result {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a message; the database assigns the next sequence number.
    pub fn insert_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        tokens_used: Option<u32>,
    ) -> Result<ConversationMessage> {
        let conn = self.conn()?;
        insert_message(&conn, conversation_id, role, content, tokens_used)
    }

    /// The `limit` most recent messages of a conversation, in creation order.
    pub fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, conversation_id, role, content, tokens_used, created_at
             FROM conversation_messages
             WHERE conversation_id = ?1
             ORDER BY seq DESC
             LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(params![conversation_id, limit as i64], map_message_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Query returns newest-first; callers want creation order
        messages.reverse();
        Ok(messages)
    }

    /// All messages of a conversation in creation order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, conversation_id, role, content, tokens_used, created_at
             FROM conversation_messages
             WHERE conversation_id = ?1
             ORDER BY seq",
        )?;

        let messages = stmt
            .query_map(params![conversation_id], map_message_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    // =========================================================================
    // Usage Metering
    // =========================================================================

    /// Additive usage increment outside any surrounding transaction.
    pub fn record_usage(
        &self,
        owner: &OwnerId,
        day: NaiveDate,
        category: UsageCategory,
        tokens: u64,
        cost: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        record_usage(&conn, owner, day, category, tokens, cost)
    }

    /// Daily usage rows for the owner's trailing window, newest first.
    pub fn usage_stats(&self, owner: &OwnerId, days: u32) -> Result<Vec<UsageStat>> {
        let cutoff = Utc::now().date_naive() - chrono::Days::new(u64::from(days.saturating_sub(1)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT owner_id, day, total_tokens, total_cost, request_count,
                    generation_tokens, chat_tokens, analysis_tokens
             FROM usage_stats
             WHERE owner_id = ?1 AND day >= ?2
             ORDER BY day DESC",
        )?;

        let stats = stmt
            .query_map(params![owner.as_str(), cutoff.to_string()], |row| {
                Ok(UsageStat {
                    owner_id: OwnerId::new(row.get::<_, String>(0)?),
                    day: parse_day(&row.get::<_, String>(1)?),
                    total_tokens: row.get::<_, i64>(2)? as u64,
                    total_cost: row.get(3)?,
                    request_count: row.get::<_, i64>(4)? as u64,
                    generation_tokens: row.get::<_, i64>(5)? as u64,
                    chat_tokens: row.get::<_, i64>(6)? as u64,
                    analysis_tokens: row.get::<_, i64>(7)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    // =========================================================================
    // Insights
    // =========================================================================

    pub fn insert_insight(&self, insight: &Insight) -> Result<()> {
        let conn = self.conn()?;
        insert_insight(&conn, insight)
    }

    /// The most recent insights for an entity, newest first.
    pub fn recent_insights(&self, entity_id: &str, limit: usize) -> Result<Vec<Insight>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, kind, summary, confidence, metadata, created_at
             FROM insights
             WHERE entity_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;

        let rows: Vec<(String, String, String, String, f64, String, String)> = stmt
            .query_map(params![entity_id, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut insights = Vec::with_capacity(rows.len());
        for (id, entity_id, kind, summary, confidence, metadata_str, created_at) in rows {
            let metadata = serde_json::from_str(&metadata_str)
                .with_context_fn(|| format!("Corrupted insight metadata for {}", id))?;

            insights.push(Insight {
                id,
                entity_id,
                kind: InsightKind::parse_or_default(&kind),
                summary,
                confidence,
                metadata,
                created_at: parse_timestamp(&created_at),
            });
        }

        Ok(insights)
    }
}

// =============================================================================
// Connection-Level Operations
// =============================================================================
//
// Usable both standalone and inside `Database::transaction` closures when a
// record and its usage increment must commit atomically.

/// Write back an analysis-derived score and priority.
pub fn apply_entity_score(
    conn: &Connection,
    entity_id: &str,
    score: u8,
    priority: u8,
) -> Result<()> {
    conn.execute(
        "UPDATE entities SET score = ?1, priority = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            score as i64,
            priority as i64,
            Utc::now().to_rfc3339(),
            entity_id,
        ],
    )
    .with_context("Failed to apply entity score")?;
    Ok(())
}

/// Append an insight row for an entity.
pub fn insert_insight(conn: &Connection, insight: &Insight) -> Result<()> {
    let metadata = serde_json::to_string(&insight.metadata)
        .with_context("Failed to serialize insight metadata")?;

    conn.execute(
        "INSERT INTO insights
         (id, entity_id, kind, summary, confidence, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            insight.id,
            insight.entity_id,
            insight.kind.as_str(),
            insight.summary,
            insight.confidence,
            metadata,
            insight.created_at.to_rfc3339(),
        ],
    )
    .with_context("Failed to insert insight")?;
    Ok(())
}

/// Append a conversation message; the database assigns the next sequence
/// number.
pub fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    role: MessageRole,
    content: &str,
    tokens_used: Option<u32>,
) -> Result<ConversationMessage> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO conversation_messages
         (id, conversation_id, role, content, tokens_used, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            conversation_id,
            role.as_str(),
            content,
            tokens_used.map(|t| t as i64),
            now.to_rfc3339(),
        ],
    )
    .with_context("Failed to insert message")?;

    Ok(ConversationMessage {
        id,
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        tokens_used,
        seq: conn.last_insert_rowid(),
        created_at: now,
    })
}

/// Insert an append-only generation record.
pub fn insert_generation_record(conn: &Connection, record: &GenerationRecord) -> Result<()> {
    let parameters = serde_json::to_string(&record.parameters)
        .with_context("Failed to serialize generation parameters")?;

    conn.execute(
        "INSERT INTO generation_records
         (id, owner_id, entity_id, template_id, kind, input, output, model,
          tokens_used, cost, parameters, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id,
            record.owner_id.as_str(),
            record.entity_id,
            record.template_id,
            record.kind.as_str(),
            record.input,
            record.output,
            record.model,
            record.tokens_used as i64,
            record.cost,
            parameters,
            record.created_at.to_rfc3339(),
        ],
    )
    .with_context("Failed to insert generation record")?;
    Ok(())
}

/// Atomic additive upsert of one day's usage for an owner.
///
/// Increments are applied inside the database so concurrent writers never
/// lose updates. The category column name comes from a fixed enum, never
/// from caller input.
pub fn record_usage(
    conn: &Connection,
    owner: &OwnerId,
    day: NaiveDate,
    category: UsageCategory,
    tokens: u64,
    cost: f64,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO usage_stats
         (owner_id, day, total_tokens, total_cost, request_count, {col})
         VALUES (?1, ?2, ?3, ?4, 1, ?3)
         ON CONFLICT(owner_id, day) DO UPDATE SET
             total_tokens = total_tokens + excluded.total_tokens,
             total_cost = total_cost + excluded.total_cost,
             request_count = request_count + 1,
             {col} = {col} + excluded.{col}",
        col = category.column()
    );

    conn.execute(
        &sql,
        params![owner.as_str(), day.to_string(), tokens as i64, cost],
    )
    .with_context("Failed to record usage")?;
    Ok(())
}

// =============================================================================
// Row Mapping
// =============================================================================

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

fn map_template_row(row: &Row<'_>) -> rusqlite::Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: row.get(0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        category: row.get(3)?,
        body: row.get(4)?,
        visibility: TemplateVisibility::parse_or_default(&row.get::<_, String>(5)?),
        active: row.get(6)?,
        created_at: parse_timestamp(&row.get::<_, String>(7)?),
        updated_at: parse_timestamp(&row.get::<_, String>(8)?),
    })
}

fn map_entity_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        company: row.get(3)?,
        role: row.get(4)?,
        industry: row.get(5)?,
        location: row.get(6)?,
        score: row.get::<_, i64>(7)? as u8,
        priority: row.get::<_, i64>(8)? as u8,
        status: EntityStatus::parse_or_default(&row.get::<_, String>(9)?),
        notes: row.get(10)?,
        created_at: parse_timestamp(&row.get::<_, String>(11)?),
        updated_at: parse_timestamp(&row.get::<_, String>(12)?),
    })
}

fn map_generation_row(row: &Row<'_>) -> rusqlite::Result<GenerationRecord> {
    let parameters: String = row.get(10)?;
    Ok(GenerationRecord {
        id: row.get(0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        entity_id: row.get(2)?,
        template_id: row.get(3)?,
        kind: GenerationKind::parse_or_default(&row.get::<_, String>(4)?),
        input: row.get(5)?,
        output: row.get(6)?,
        model: row.get(7)?,
        tokens_used: row.get::<_, i64>(8)? as u32,
        cost: row.get(9)?,
        parameters: serde_json::from_str(&parameters).unwrap_or(serde_json::Value::Null),
        created_at: parse_timestamp(&row.get::<_, String>(11)?),
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<ConversationMessage> {
    Ok(ConversationMessage {
        seq: row.get(0)?,
        id: row.get(1)?,
        conversation_id: row.get(2)?,
        role: MessageRole::parse_or_default(&row.get::<_, String>(3)?),
        content: row.get(4)?,
        tokens_used: row.get::<_, Option<i64>>(5)?.map(|t| t as u32),
        created_at: parse_timestamp(&row.get::<_, String>(6)?),
    })
}
