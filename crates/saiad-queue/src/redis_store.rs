//! Redis-backed Job State Store.
//!
//! Keys:
//! - `saiad:job:{id}`: JSON record, TTL refreshed on every write
//! - `saiad:idem:{key}`: idempotency key to job id
//! - `saiad:jobs:active`: set of non-terminal job ids
//! - `saiad:jobs:created`: sorted set of job ids by creation time
//!
//! Creation writes the idempotency key, the record and both indexes in one
//! script. Later writes are compare-and-swap on the record's `revision`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use saiad_models::{GenerationJob, JobId};
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::queue::QueueConfig;
use crate::store::{CreateOutcome, JobMutation, JobStore};

const JOB_KEY_PREFIX: &str = "saiad:job:";
const ACTIVE_KEY: &str = "saiad:jobs:active";
const CREATED_KEY: &str = "saiad:jobs:created";
const MAX_CAS_ATTEMPTS: u32 = 8;

/// KEYS[1] idempotency key, KEYS[2] job key, KEYS[3] active set,
/// KEYS[4] created index
/// ARGV[1] job id, ARGV[2] record, ARGV[3] ttl secs, ARGV[4] created at
/// (ms), ARGV[5] job key prefix
///
/// Returns `{1, record}` when created, `{0, existing record}` otherwise.
/// A key left pointing at a purged record is taken over.
const CREATE_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  local record = redis.call('GET', ARGV[5] .. existing)
  if record then
    return {0, record}
  end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[3]))
redis.call('SET', KEYS[2], ARGV[2], 'EX', tonumber(ARGV[3]))
redis.call('SADD', KEYS[3], ARGV[1])
redis.call('ZADD', KEYS[4], tonumber(ARGV[4]), ARGV[1])
return {1, ARGV[2]}
"#;

/// KEYS[1] job key, KEYS[2] active set
/// ARGV[1] expected revision, ARGV[2] new record, ARGV[3] ttl secs,
/// ARGV[4] "1" when the new record is terminal, ARGV[5] job id
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
local revision = cjson.decode(current)['revision'] or 0
if tostring(revision) ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
if ARGV[4] == '1' then
  redis.call('SREM', KEYS[2], ARGV[5])
end
return 1
"#;

pub struct RedisJobStore {
    client: redis::Client,
    ttl_secs: u64,
    create: redis::Script,
    cas: redis::Script,
}

impl RedisJobStore {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            ttl_secs: config.job_ttl.as_secs().max(1),
            create: redis::Script::new(CREATE_SCRIPT),
            cas: redis::Script::new(CAS_SCRIPT),
        })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(&QueueConfig::from_env())
    }

    pub fn job_key(job_id: &JobId) -> String {
        format!("{}{}", JOB_KEY_PREFIX, job_id)
    }

    pub fn idempotency_key(key: &str) -> String {
        format!("saiad:idem:{}", key)
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<Option<GenerationJob>> {
        let raw: Option<String> = conn.get(Self::job_key(job_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(QueueError::from))
            .transpose()
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn create(&self, job: GenerationJob) -> QueueResult<CreateOutcome> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;

        let (created, record): (i64, String) = self
            .create
            .key(Self::idempotency_key(&job.idempotency_key))
            .key(Self::job_key(&job.id))
            .key(ACTIVE_KEY)
            .key(CREATED_KEY)
            .arg(job.id.as_str())
            .arg(payload)
            .arg(self.ttl_secs)
            .arg(job.created_at.timestamp_millis())
            .arg(JOB_KEY_PREFIX)
            .invoke_async(&mut conn)
            .await?;

        if created == 1 {
            return Ok(CreateOutcome::Created(job));
        }
        let existing: GenerationJob = serde_json::from_str(&record)?;
        debug!(job_id = %existing.id, "Idempotency key already used");
        Ok(CreateOutcome::Existing(existing))
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        let mut conn = self.conn().await?;
        self.load(&mut conn, job_id).await
    }

    async fn mutate(
        &self,
        job_id: &JobId,
        mutation: JobMutation<'_>,
    ) -> QueueResult<GenerationJob> {
        let mut conn = self.conn().await?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .load(&mut conn, job_id)
                .await?
                .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

            let mut next = current.clone();
            mutation(&mut next).map_err(|e| QueueError::invalid_transition(job_id, e))?;
            let payload = serde_json::to_string(&next)?;

            let result: i64 = self
                .cas
                .key(Self::job_key(job_id))
                .key(ACTIVE_KEY)
                .arg(current.revision.to_string())
                .arg(payload)
                .arg(self.ttl_secs)
                .arg(if next.is_terminal() { "1" } else { "0" })
                .arg(job_id.as_str())
                .invoke_async(&mut conn)
                .await?;

            match result {
                1 => return Ok(next),
                -1 => return Err(QueueError::JobNotFound(job_id.clone())),
                _ => debug!(job_id = %job_id, attempt, "Revision conflict, retrying"),
            }
        }

        warn!(job_id = %job_id, "Gave up after repeated revision conflicts");
        Err(QueueError::Conflict(job_id.clone()))
    }

    async fn active_jobs(&self) -> QueueResult<Vec<GenerationJob>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(ACTIVE_KEY).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let id = JobId::from_string(id);
            match self.load(&mut conn, &id).await? {
                Some(job) if !job.is_terminal() => jobs.push(job),
                // Expired or already terminal: drop the stale index entry.
                _ => conn.srem::<_, _, ()>(ACTIVE_KEY, id.as_str()).await?,
            }
        }
        Ok(jobs)
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrangebyscore(CREATED_KEY, "-inf", cutoff.timestamp_millis())
            .await?;

        let mut purged = 0;
        for id in ids {
            let id = JobId::from_string(id);
            let purge = match self.load(&mut conn, &id).await? {
                Some(job) => {
                    job.is_terminal() && job.finished_at.unwrap_or(job.updated_at) < cutoff
                }
                None => true,
            };
            if purge {
                redis::pipe()
                    .del(Self::job_key(&id))
                    .ignore()
                    .zrem(CREATED_KEY, id.as_str())
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
