use crate::model_catalog::ModelCapabilities;
use crate::pool::{AccountScoreInputs, InFlightExclusions, QuotaCache};
use crate::providers::antigravity::resource::AntigravityResource;
use crate::providers::manifest::AntigravityLease;
use chrono::{DateTime, Utc};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

/// Runtime credential = base data + dynamic capabilities.
#[derive(Debug, Clone)]
pub struct RuntimeCredential {
    /// Base credential data (persisted).
    pub inner: AntigravityResource,

    /// Dynamic capability bitset (runtime-only unless persisted elsewhere).
    pub caps: ModelCapabilities,

    /// Lifetime assignment count, fed into the account-selection score.
    pub usage_count: u64,
    /// Last time this credential was handed out, fed into the score.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RuntimeCredential {
    /// Constructor: assign initial capabilities on load.
    /// Typically `ModelCapabilities::all()` to start optimistic and disable on errors.
    pub fn new(inner: AntigravityResource, initial_caps: ModelCapabilities) -> Self {
        Self {
            inner,
            caps: initial_caps,
            usage_count: 0,
            last_used_at: None,
        }
    }

    /// Proxy: check expiration via the inner credential.
    #[inline(always)]
    pub fn is_expired(&self) -> bool {
        self.inner.is_expired()
    }
}

pub type CredentialId = u64;
pub type ModelIndex = usize;

#[derive(Debug, Default)]
pub struct AssignmentResult {
    pub assigned: Option<AntigravityLease>,
    pub refresh_ids: Vec<CredentialId>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CooldownTicket(Reverse<Instant>, CredentialId, ModelIndex);

/// Core scheduling logic for credentials (no IO, no locks).
pub struct CredentialManager {
    creds: HashMap<CredentialId, RuntimeCredential>,
    queues: Vec<VecDeque<CredentialId>>,
    waiting_room: BinaryHeap<CooldownTicket>,
    cooldown_map: HashMap<(CredentialId, ModelIndex), Instant>,
    refreshing: HashSet<CredentialId>,
    quota: QuotaCache,
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CredentialManager {
    pub fn new(model_count: usize) -> Self {
        Self {
            creds: HashMap::new(),
            queues: vec![VecDeque::new(); model_count],
            waiting_room: BinaryHeap::new(),
            cooldown_map: HashMap::new(),
            refreshing: HashSet::new(),
            quota: QuotaCache::new(),
        }
    }

    /// Shared with the client layer so an upstream response's quota headers
    /// (or a 429 carrying none) can update the same cache this manager
    /// scores candidates against.
    pub fn quota_cache(&self) -> &QuotaCache {
        &self.quota
    }

    pub fn add_credential(
        &mut self,
        id: CredentialId,
        cred: AntigravityResource,
        initial_caps_bits: u64,
    ) {
        let initial_caps = ModelCapabilities::from_bits(initial_caps_bits);
        let (caps, usage_count, last_used_at) = self
            .creds
            .get(&id)
            .map(|cred| (cred.caps, cred.usage_count, cred.last_used_at))
            .unwrap_or((initial_caps, 0, None));

        let mut runtime = RuntimeCredential::new(cred, caps);
        runtime.usage_count = usage_count;
        runtime.last_used_at = last_used_at;
        self.creds.insert(id, runtime);
        self.refreshing.remove(&id);

        for (index, queue) in self.queues.iter_mut().enumerate() {
            if !caps.supports(index) {
                continue;
            }

            if !queue.contains(&id) {
                queue.push_back(id);
            }
        }
    }

    fn index_from_mask(&self, model_mask: u64) -> Option<ModelIndex> {
        if model_mask == 0 || (model_mask & (model_mask - 1)) != 0 {
            return None;
        }
        let index = model_mask.trailing_zeros() as usize;
        if index >= self.queues.len() {
            return None;
        }
        Some(index)
    }

    pub fn mark_refreshing(&mut self, id: CredentialId) {
        self.refreshing.insert(id);
        self.clear_cooldowns_for(id);
    }

    pub fn mark_model_unsupported(
        &mut self,
        id: CredentialId,
        model_mask: u64,
    ) -> Option<(u64, u64)> {
        if model_mask == 0 {
            return None;
        }
        let cred = self.creds.get_mut(&id)?;
        let before = cred.caps.bits();
        cred.caps.disable_mask(model_mask);
        let after = cred.caps.bits();
        Some((before, after))
    }

    pub fn delete_credential(&mut self, id: CredentialId) {
        self.creds.remove(&id);
        self.refreshing.remove(&id);
        self.clear_cooldowns_for(id);
    }

    pub fn report_rate_limit(&mut self, id: CredentialId, model_mask: u64, cooldown: Duration) {
        let Some(model_index) = self.index_from_mask(model_mask) else {
            return;
        };
        let deadline = Instant::now() + cooldown;

        self.cooldown_map.insert((id, model_index), deadline);
        self.waiting_room
            .push(CooldownTicket(Reverse(deadline), id, model_index));
    }

    pub fn get_full_credential_copy(&self, id: CredentialId) -> Option<AntigravityResource> {
        self.creds.get(&id).map(|cred| cred.inner.clone())
    }

    pub fn project_id_of(&self, id: CredentialId) -> Option<String> {
        self.creds
            .get(&id)
            .map(|cred| cred.inner.project_id().to_string())
    }

    pub fn contains(&self, id: CredentialId) -> bool {
        self.creds.contains_key(&id)
    }

    /// Plain FIFO assignment, no exclusions. Kept for callers that don't
    /// need score-based ranking.
    pub fn get_assigned(&mut self, model_mask: u64) -> AssignmentResult {
        self.get_assigned_scored(model_mask, &InFlightExclusions::default())
    }

    /// Peeks the whole queue for `model_mask`, scores every resident
    /// candidate that isn't cooling, refreshing, or excluded, and assigns
    /// the best-scoring one. Every candidate that wasn't picked (including
    /// the ones merely visited while scoring) is requeued at the back, so
    /// the queue's fairness-via-rotation discipline is preserved.
    pub fn get_assigned_scored(
        &mut self,
        model_mask: u64,
        exclusions: &InFlightExclusions,
    ) -> AssignmentResult {
        self.process_waiting_room();

        let mut result = AssignmentResult::default();

        let Some(model_index) = self.index_from_mask(model_mask) else {
            return result;
        };
        let Some(queue) = self.queues.get_mut(model_index) else {
            return result;
        };

        let candidates: Vec<CredentialId> = queue.drain(..).collect();
        let mut requeue = Vec::with_capacity(candidates.len());
        let mut best: Option<(CredentialId, String, f64)> = None;

        for id in candidates {
            let Some(cred) = self.creds.get(&id) else {
                continue;
            };

            if !cred.caps.supports(model_index) {
                continue;
            }

            if self.refreshing.contains(&id)
                || self.is_model_cooling(id, model_index)
                || exclusions.contains(id)
                || self.quota.is_quota_exhausted(id)
            {
                requeue.push(id);
                continue;
            }

            let Some(token) = cred
                .inner
                .access_token()
                .filter(|_| !cred.is_expired())
                .map(str::to_owned)
            else {
                result.refresh_ids.push(id);
                continue;
            };

            let quota_health = self
                .quota
                .get(id)
                .map(|info| info.health_score())
                .unwrap_or(40.0);
            let candidate_score = crate::pool::score(AccountScoreInputs {
                quota_health,
                usage_count: cred.usage_count,
                last_used_at: cred.last_used_at,
            });

            let is_better = best.as_ref().is_none_or(|(_, _, s)| candidate_score > *s);
            if is_better {
                if let Some((prev_id, _, _)) = best.take() {
                    requeue.push(prev_id);
                }
                best = Some((id, token, candidate_score));
            } else {
                requeue.push(id);
            }
        }

        for id in requeue {
            if let Some(queue) = self.queues.get_mut(model_index) {
                queue.push_back(id);
            }
        }

        if let Some((id, token, _)) = best {
            if let Some(queue) = self.queues.get_mut(model_index) {
                queue.push_back(id);
            }

            let project_id = self
                .creds
                .get(&id)
                .map(|c| c.inner.project_id().to_string())
                .unwrap_or_default();

            if let Some(cred) = self.creds.get_mut(&id) {
                cred.usage_count += 1;
                cred.last_used_at = Some(Utc::now());
            }

            result.assigned = Some(AntigravityLease {
                id,
                project_id,
                access_token: token,
            });
        }

        result
    }

    fn process_waiting_room(&mut self) {
        let now = Instant::now();

        while self.waiting_room.peek().is_some_and(|t| (t.0).0 <= now) {
            let CooldownTicket(Reverse(ticket_deadline), credential_id, model_index) =
                self.waiting_room.pop().expect("peek guaranteed existence");

            match self.cooldown_map.entry((credential_id, model_index)) {
                std::collections::hash_map::Entry::Occupied(entry)
                    if ticket_deadline >= *entry.get() =>
                {
                    let ((reclaimed_cred_id, reclaimed_model_index), _) = entry.remove_entry();
                    if let Some(target_queue) = self.queues.get_mut(reclaimed_model_index) {
                        target_queue.push_back(reclaimed_cred_id);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn queue_len(&self, model_mask: u64) -> usize {
        self.index_from_mask(model_mask)
            .and_then(|model_index| self.queues.get(model_index).map(|q| q.len()))
            .unwrap_or(0)
    }

    pub fn total_creds(&self) -> usize {
        self.creds.len()
    }

    pub fn refreshing_len(&self) -> usize {
        self.refreshing.len()
    }

    pub fn is_refreshing(&self, id: CredentialId) -> bool {
        self.refreshing.contains(&id)
    }

    pub fn cooldown_len(&self) -> usize {
        self.cooldown_map.len()
    }

    fn is_model_cooling(&self, id: CredentialId, model_index: ModelIndex) -> bool {
        match self.cooldown_map.get(&(id, model_index)) {
            Some(deadline) => Instant::now() < *deadline,
            None => false,
        }
    }

    fn clear_cooldowns_for(&mut self, id: CredentialId) {
        self.cooldown_map.retain(|(cid, _), _| *cid != id);
    }
}
