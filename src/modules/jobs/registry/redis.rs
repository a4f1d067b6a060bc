use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{JobRegistry, Submission};
use crate::error::{IntakeError, Result};
use crate::infrastructure::redis::client::RedisService;
use crate::modules::jobs::model::{Job, JobStatus, TransformSpec, Transition};

const MAX_CAS_ATTEMPTS: usize = 16;
const SCAN_BATCH: usize = 200;

// KEYS[1] = idempotency index key, KEYS[2] = new job key
// ARGV[1] = new job id, ARGV[2] = new job json, ARGV[3] = job key prefix
const SUBMIT_SCRIPT: &str = r#"
local bound = redis.call('GET', KEYS[1])
if bound then
  local raw = redis.call('GET', ARGV[3] .. bound)
  if raw then
    local status = cjson.decode(raw)['status']
    if status == 'PENDING' or status == 'RUNNING' then
      return {0, raw}
    end
  end
end
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SET', KEYS[1], ARGV[1])
return {1, ARGV[2]}
"#;

// KEYS[1] = job key, ARGV[1] = expected json, ARGV[2] = replacement json
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Key names for one registry namespace.
///
/// The prefix is wrapped in a hash tag (`{transform}:job:<id>`, `{transform}:key:<k>`) so
/// every key of a namespace hashes to the same cluster slot. The submit script reads a job
/// key it derives from the index value, which is only valid when both live in one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    tag: String,
}

impl KeyLayout {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches(':');
        let tagged = prefix.contains('{') && prefix.contains('}');
        let tag = if tagged {
            prefix.to_string()
        } else {
            format!("{{{}}}", prefix)
        };
        Self { tag }
    }

    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.tag)
    }

    pub fn job_key(&self, id: Uuid) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    pub fn index_key(&self, idempotency_key: &str) -> String {
        format!("{}:key:{}", self.tag, idempotency_key)
    }

    pub fn id_from_job_key(&self, key: &str) -> Option<Uuid> {
        key.strip_prefix(&self.job_prefix())
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Registry backed by Redis so job state survives intake restarts and can be shared by
/// several intake replicas. Key binding runs as one Lua script; status changes are
/// optimistic compare-and-set writes retried on conflict.
pub struct RedisJobRegistry {
    redis: RedisService,
    keys: KeyLayout,
    submit_script: Script,
    cas_script: Script,
}

impl RedisJobRegistry {
    pub fn new(redis: RedisService, prefix: &str) -> Self {
        Self {
            redis,
            keys: KeyLayout::new(prefix),
            submit_script: Script::new(SUBMIT_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        }
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    async fn transition(
        &self,
        conn: &mut MultiplexedConnection,
        id: Uuid,
        status: JobStatus,
        detail: Option<String>,
    ) -> Result<(Job, Transition)> {
        let key = self.keys.job_key(id);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw: Option<String> = conn.get(&key).await?;
            let raw = raw.ok_or(IntakeError::NotFound(id))?;
            let mut job: Job = serde_json::from_str(&raw)?;

            let outcome = job
                .apply(status, detail.clone())
                .map_err(|(from, to)| IntakeError::InvalidTransition { job_id: id, from, to })?;
            if outcome == Transition::Duplicate {
                return Ok((job, outcome));
            }

            let replacement = serde_json::to_string(&job)?;
            let swapped: i64 = self
                .cas_script
                .key(&key)
                .arg(&raw)
                .arg(&replacement)
                .invoke_async(conn)
                .await?;

            match swapped {
                1 => return Ok((job, outcome)),
                -1 => return Err(IntakeError::NotFound(id)),
                _ => debug!("Job {} changed concurrently (attempt {}), retrying", id, attempt),
            }
        }

        Err(IntakeError::Registry(format!(
            "job {} is under heavy contention, giving up after {} attempts",
            id, MAX_CAS_ATTEMPTS
        )))
    }
}

#[async_trait]
impl JobRegistry for RedisJobRegistry {
    async fn submit(&self, request: TransformSpec) -> Result<Submission> {
        let mut conn = self.redis.get_conn();
        let job = Job::new(request);
        let payload = serde_json::to_string(&job)?;
        let job_key = self.keys.job_key(job.id);

        let Some(idempotency_key) = job.request.idempotency_key.as_deref() else {
            let stored: bool = conn.set_nx(&job_key, &payload).await?;
            if !stored {
                return Err(IntakeError::Registry(format!("job id {} already in use", job.id)));
            }
            return Ok(Submission { job, created: true });
        };

        let (created, raw): (i64, String) = self
            .submit_script
            .key(self.keys.index_key(idempotency_key))
            .key(&job_key)
            .arg(job.id.to_string())
            .arg(&payload)
            .arg(self.keys.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        if created == 1 {
            Ok(Submission { job, created: true })
        } else {
            let existing: Job = serde_json::from_str(&raw)?;
            debug!("Key '{}' already bound to active job {}", idempotency_key, existing.id);
            Ok(Submission { job: existing, created: false })
        }
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        let mut conn = self.redis.get_conn();
        let raw: Option<String> = conn.get(self.keys.job_key(id)).await?;
        let raw = raw.ok_or(IntakeError::NotFound(id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn update(&self, id: Uuid, status: JobStatus, detail: Option<String>) -> Result<Job> {
        let mut conn = self.redis.get_conn();
        let (job, outcome) = self.transition(&mut conn, id, status, detail).await?;
        if outcome == Transition::Duplicate {
            warn!("Ignoring duplicate {} report for job {}", status, id);
        }
        Ok(job)
    }

    async fn fail_in_flight(&self, reason: &str) -> Result<usize> {
        let mut conn = self.redis.get_conn();
        let pattern = format!("{}*", self.keys.job_prefix());
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            ids.extend(keys.iter().filter_map(|key| self.keys.id_from_job_key(key)));
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut failed = 0;
        for id in ids {
            match self
                .transition(&mut conn, id, JobStatus::Failed, Some(reason.to_string()))
                .await
            {
                Ok((_, Transition::Applied)) => failed += 1,
                Ok((_, Transition::Duplicate)) => {}
                Err(IntakeError::InvalidTransition { .. }) | Err(IntakeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(failed)
    }
}
