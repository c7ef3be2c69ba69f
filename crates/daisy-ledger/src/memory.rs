//! In-memory DAISY contract.
//!
//! Enforces the same rules as the deployed contract: exact fee in the
//! configured token, write-once answers guarded by "already answered", and
//! a reward transfer paid out of the contract balance in the same group as
//! the answer. Scripted faults let tests drive the gateway error classes.

use crate::gateway::{GatewayError, GatewayResult, LedgerGateway};
use daisy_core::{
    Address, AssetId, ContractConfig, MicroAlgos, PostQuery, PostReceipt, Query, QueryId,
    Receipt, MAX_TEXT_BYTES,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Minimum per-transaction fee charged by the simulation.
pub const SIM_MIN_FEE: u64 = 1_000;

/// Gateway operation, used to target scripted faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    ReadConfig,
    ReadQuery,
    SubmitAnswer,
    OptIn,
    PostQuery,
}

struct LedgerState {
    config: ContractConfig,
    app_address: Address,
    queries: BTreeMap<QueryId, Query>,
    balances: HashMap<(Address, AssetId), u64>,
    round: u64,
    tx_counter: u64,
    hidden: HashSet<QueryId>,
    faults: VecDeque<(LedgerOp, GatewayError)>,
    submit_attempts: HashMap<QueryId, u32>,
}

impl LedgerState {
    fn take_fault(&mut self, op: LedgerOp) -> Option<GatewayError> {
        let pos = self.faults.iter().position(|(o, _)| *o == op)?;
        self.faults.remove(pos).map(|(_, e)| e)
    }

    fn is_opted_in(&self, account: &Address, asset: AssetId) -> bool {
        self.balances.contains_key(&(account.clone(), asset))
    }

    fn balance(&self, account: &Address, asset: AssetId) -> u64 {
        self.balances
            .get(&(account.clone(), asset))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, asset: AssetId, amount: u64) -> GatewayResult<()> {
        if !self.is_opted_in(to, asset) {
            return Err(GatewayError::permanent(format!(
                "receiver {} is not opted into asset {}",
                to, asset
            )));
        }
        let available = self.balance(from, asset);
        if available < amount {
            return Err(GatewayError::permanent(format!(
                "{} holds {} of asset {}, needs {}",
                from, available, asset, amount
            )));
        }
        *self.balances.entry((from.clone(), asset)).or_insert(0) -= amount;
        *self.balances.entry((to.clone(), asset)).or_insert(0) += amount;
        Ok(())
    }

    fn commit(&mut self) -> (String, u64) {
        self.tx_counter += 1;
        self.round += 1;
        (format!("SIMTX{:06}", self.tx_counter), self.round)
    }
}

/// Shared in-memory ledger holding one DAISY contract.
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Deploy a contract governed by `governor`, charging `fee` units of `token`.
    /// The contract account is opted into `token` on creation.
    pub fn new(governor: impl Into<Address>, token: AssetId, fee: u64) -> Arc<Self> {
        let app_address = Address::new("DAISYAPPACCOUNT");
        let mut balances = HashMap::new();
        balances.insert((app_address.clone(), token), 0);
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                config: ContractConfig {
                    governor: governor.into(),
                    token,
                    query_fee: fee,
                    next_query_id: QueryId::FIRST,
                },
                app_address,
                queries: BTreeMap::new(),
                balances,
                round: 1,
                tx_counter: 0,
                hidden: HashSet::new(),
                faults: VecDeque::new(),
                submit_attempts: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // a panicked test thread must not wedge the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A gateway that signs as `account`.
    pub fn connect(self: &Arc<Self>, account: impl Into<Address>) -> MemoryGateway {
        MemoryGateway {
            ledger: Arc::clone(self),
            account: account.into(),
        }
    }

    pub fn app_address(&self) -> Address {
        self.lock().app_address.clone()
    }

    /// Opt `account` into `asset` (if needed) and credit it `amount`.
    pub fn fund(&self, account: impl Into<Address>, asset: AssetId, amount: u64) {
        let mut state = self.lock();
        *state.balances.entry((account.into(), asset)).or_insert(0) += amount;
    }

    pub fn balance(&self, account: impl Into<Address>, asset: AssetId) -> u64 {
        self.lock().balance(&account.into(), asset)
    }

    pub fn config(&self) -> ContractConfig {
        self.lock().config.clone()
    }

    /// Governor-only fee change.
    pub fn set_fee(&self, caller: impl Into<Address>, fee: u64) -> GatewayResult<()> {
        let mut state = self.lock();
        if caller.into() != state.config.governor {
            return Err(GatewayError::permanent("Only governor can set fee"));
        }
        state.config.query_fee = fee;
        Ok(())
    }

    /// Stored query, bypassing faults and hidden ids.
    pub fn query(&self, id: QueryId) -> Option<Query> {
        self.lock().queries.get(&id).cloned()
    }

    /// Make `read_query` report `id` as absent, as a lagging node would.
    pub fn hide_query(&self, id: QueryId) {
        self.lock().hidden.insert(id);
    }

    pub fn reveal_query(&self, id: QueryId) {
        self.lock().hidden.remove(&id);
    }

    /// Advance `next_query_id` without storing a query, leaving a gap.
    pub fn skip_query_id(&self) {
        let mut state = self.lock();
        state.config.next_query_id = state.config.next_query_id.next();
    }

    /// Fail the next call of `op` with `err`. Faults queue up in order.
    pub fn fail_next(&self, op: LedgerOp, err: GatewayError) {
        self.lock().faults.push_back((op, err));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// How many times `submit_answer` reached the ledger for `id`.
    pub fn submit_attempts(&self, id: QueryId) -> u32 {
        self.lock().submit_attempts.get(&id).copied().unwrap_or(0)
    }

    fn read_config(&self) -> GatewayResult<ContractConfig> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(LedgerOp::ReadConfig) {
            return Err(err);
        }
        Ok(state.config.clone())
    }

    fn read_query(&self, id: QueryId) -> GatewayResult<Option<Query>> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(LedgerOp::ReadQuery) {
            return Err(err);
        }
        if state.hidden.contains(&id) {
            return Ok(None);
        }
        Ok(state.queries.get(&id).cloned())
    }

    fn submit_response(
        &self,
        sender: &Address,
        id: QueryId,
        response_text: &str,
        fee_ceiling: MicroAlgos,
    ) -> GatewayResult<Receipt> {
        let mut state = self.lock();
        *state.submit_attempts.entry(id).or_insert(0) += 1;
        if let Some(err) = state.take_fault(LedgerOp::SubmitAnswer) {
            return Err(err);
        }

        let required = SIM_MIN_FEE * 2;
        if fee_ceiling.get() < required {
            return Err(GatewayError::permanent(format!(
                "fee too small: {} < {} for call plus reward transfer",
                fee_ceiling.get(),
                required
            )));
        }
        if response_text.len() > MAX_TEXT_BYTES {
            return Err(GatewayError::permanent("response text exceeds argument limit"));
        }
        let query = state
            .queries
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::permanent(format!("no box for query {}", id)))?;
        if query.is_answered {
            return Err(GatewayError::AlreadyAnswered(id));
        }

        // reward first: a failed payout must leave the query untouched
        let token = state.config.token;
        let fee = state.config.query_fee;
        let app = state.app_address.clone();
        state.transfer(&app, sender, token, fee)?;

        let answered = Query {
            provider: sender.clone(),
            response_text: response_text.to_string(),
            is_answered: true,
            ..query
        };
        state.queries.insert(id, answered);
        let (tx_id, confirmed_round) = state.commit();
        Ok(Receipt {
            tx_id,
            confirmed_round,
            fee_paid: MicroAlgos(required),
        })
    }

    fn opt_in(&self, account: &Address, token: AssetId) -> GatewayResult<()> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(LedgerOp::OptIn) {
            return Err(err);
        }
        state.balances.entry((account.clone(), token)).or_insert(0);
        Ok(())
    }

    fn post_query(&self, post: PostQuery) -> GatewayResult<PostReceipt> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(LedgerOp::PostQuery) {
            return Err(err);
        }
        if post.payment.asset_id != state.config.token {
            return Err(GatewayError::permanent("Wrong token"));
        }
        if post.payment.amount != state.config.query_fee {
            return Err(GatewayError::permanent("Wrong fee amount"));
        }
        if post.query_text.len() > MAX_TEXT_BYTES {
            return Err(GatewayError::permanent("query text exceeds argument limit"));
        }
        let app = state.app_address.clone();
        state.transfer(&post.submitter, &app, post.payment.asset_id, post.payment.amount)?;

        let query_id = state.config.next_query_id;
        state
            .queries
            .insert(query_id, Query::pending(post.submitter, post.query_text));
        state.config.next_query_id = query_id.next();
        let (tx_id, confirmed_round) = state.commit();
        Ok(PostReceipt {
            tx_id,
            confirmed_round,
            query_id,
        })
    }
}

/// [`LedgerGateway`] view of a [`MemoryLedger`] for one signing account.
#[derive(Clone)]
pub struct MemoryGateway {
    ledger: Arc<MemoryLedger>,
    account: Address,
}

impl MemoryGateway {
    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }
}

#[async_trait::async_trait]
impl LedgerGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_config(&self) -> GatewayResult<ContractConfig> {
        self.ledger.read_config()
    }

    async fn read_query(&self, id: QueryId) -> GatewayResult<Option<Query>> {
        self.ledger.read_query(id)
    }

    async fn submit_answer(
        &self,
        id: QueryId,
        response_text: &str,
        fee_ceiling: MicroAlgos,
    ) -> GatewayResult<Receipt> {
        self.ledger
            .submit_response(&self.account, id, response_text, fee_ceiling)
    }

    async fn opt_in(&self, token: AssetId) -> GatewayResult<()> {
        self.ledger.opt_in(&self.account, token)
    }

    async fn post_query(&self, post: PostQuery) -> GatewayResult<PostReceipt> {
        self.ledger.post_query(post)
    }
}
