use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use solana_program::{
    clock::UnixTimestamp,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::{Pubkey, PUBKEY_BYTES},
};
use std::convert::TryFrom;

use crate::error::RaffleError;

/// Maximum number of entries a single round can hold
pub const MAX_PLAYERS: usize = 200;
/// Maximum number of subscriptions a coordinator tracks
pub const MAX_SUBSCRIPTIONS: usize = 8;
/// Maximum number of consumers per subscription
pub const MAX_CONSUMERS: usize = 8;
/// Maximum number of requests awaiting fulfillment
pub const MAX_PENDING_REQUESTS: usize = 16;

/// Block confirmations the raffle asks the oracle to wait for
pub const REQUEST_CONFIRMATIONS: u16 = 3;
/// Random words requested per round
pub const NUM_WORDS: u32 = 1;

const PLAYERS_LEN: usize = PUBKEY_BYTES * MAX_PLAYERS;
const SUBSCRIPTION_LEN: usize = 8 + 32 + 8 + 1 + PUBKEY_BYTES * MAX_CONSUMERS;
const SUBSCRIPTIONS_LEN: usize = SUBSCRIPTION_LEN * MAX_SUBSCRIPTIONS;
const REQUEST_LEN: usize = 8 + 8 + 32 + 32 + 2 + 4 + 4;
const REQUESTS_LEN: usize = REQUEST_LEN * MAX_PENDING_REQUESTS;

/// State of the current round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    /// Entries are accepted
    Open,
    /// A randomness request is in flight, entries are blocked
    Calculating,
}

impl TryFrom<u8> for RaffleState {
    type Error = ProgramError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(RaffleState::Open),
            1 => Ok(RaffleState::Calculating),
            _ => Err(ProgramError::InvalidAccountData),
        }
    }
}

impl From<RaffleState> for u8 {
    fn from(state: RaffleState) -> Self {
        match state {
            RaffleState::Open => 0,
            RaffleState::Calculating => 1,
        }
    }
}

/// Construction-time parameters, immutable once the raffle exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleConfig {
    /// Minimum payment in lamports to enter a round
    pub entrance_fee: u64,
    /// Minimum seconds between settlements
    pub interval: UnixTimestamp,
    /// Coordinator account randomness is requested from
    pub coordinator: Pubkey,
    /// Oracle key hash forwarded with every request
    pub key_hash: [u8; 32],
    /// Coordinator subscription paying for requests
    pub subscription_id: u64,
    /// Gas budget forwarded with every request
    pub callback_gas_limit: u32,
}

impl RaffleConfig {
    pub fn validate(&self) -> Result<(), RaffleError> {
        if self.entrance_fee == 0 || self.interval < 0 {
            return Err(RaffleError::InvalidConfig);
        }
        Ok(())
    }
}

/// Raffle account data: configuration plus the current round
#[derive(Clone, Debug, PartialEq)]
pub struct Raffle {
    /// Is the account initialized
    pub is_initialized: bool,
    /// PDA bump seed
    pub bump: u8,
    /// Creator of the raffle, the only key allowed to force a reset
    pub authority: Pubkey,
    pub config: RaffleConfig,
    pub state: RaffleState,
    /// Entries in entry order, duplicates allowed
    pub players: Vec<Pubkey>,
    /// Sum of entry payments for the current round
    pub pool_balance: u64,
    /// When the previous round closed
    pub last_timestamp: UnixTimestamp,
    /// Last paid winner (default key before the first settlement)
    pub recent_winner: Pubkey,
    /// In-flight request, set iff the round is calculating
    pub pending_request_id: Option<u64>,
}

impl Raffle {
    pub fn new(
        authority: Pubkey,
        config: RaffleConfig,
        now: UnixTimestamp,
        bump: u8,
    ) -> Result<Self, RaffleError> {
        config.validate()?;
        Ok(Self {
            is_initialized: true,
            bump,
            authority,
            config,
            state: RaffleState::Open,
            players: Vec::new(),
            pool_balance: 0,
            last_timestamp: now,
            recent_winner: Pubkey::default(),
            pending_request_id: None,
        })
    }

    pub fn recent_winner(&self) -> Pubkey {
        self.recent_winner
    }

    pub fn raffle_state(&self) -> RaffleState {
        self.state
    }

    pub fn player(&self, index: usize) -> Result<Pubkey, RaffleError> {
        self.players
            .get(index)
            .copied()
            .ok_or(RaffleError::IndexOutOfRange)
    }

    pub fn number_of_players(&self) -> usize {
        self.players.len()
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> UnixTimestamp {
        self.config.interval
    }

    pub fn last_timestamp(&self) -> UnixTimestamp {
        self.last_timestamp
    }

    pub fn pool_balance(&self) -> u64 {
        self.pool_balance
    }

    pub fn pending_request_id(&self) -> Option<u64> {
        self.pending_request_id
    }
}

/// A coordinator subscription that pays for fulfillments
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: u64,
    pub owner: Pubkey,
    /// Lamports available to pay for fulfillments
    pub balance: u64,
    /// Accounts allowed to request randomness against this subscription
    pub consumers: Vec<Pubkey>,
}

/// A randomness request awaiting fulfillment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: u64,
    pub subscription_id: u64,
    /// Account the random words are delivered to
    pub consumer: Pubkey,
    pub key_hash: [u8; 32],
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

/// Coordinator account data
#[derive(Clone, Debug, PartialEq)]
pub struct VrfCoordinator {
    pub is_initialized: bool,
    pub bump: u8,
    /// Oracle key allowed to fulfill requests
    pub authority: Pubkey,
    /// Flat lamport fee charged per fulfillment
    pub base_fee: u64,
    /// Additional lamports charged per delivered word
    pub fee_per_word: u64,
    pub next_subscription_id: u64,
    pub next_request_id: u64,
    pub subscriptions: Vec<Subscription>,
    pub requests: Vec<PendingRequest>,
}

impl VrfCoordinator {
    pub fn new(authority: Pubkey, base_fee: u64, fee_per_word: u64, bump: u8) -> Self {
        Self {
            is_initialized: true,
            bump,
            authority,
            base_fee,
            fee_per_word,
            next_subscription_id: 1,
            next_request_id: 1,
            subscriptions: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl Sealed for Raffle {}
impl Sealed for VrfCoordinator {}

impl IsInitialized for Raffle {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl IsInitialized for VrfCoordinator {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

fn unpack_pubkeys(src: &[u8], count: usize) -> Vec<Pubkey> {
    src.chunks_exact(PUBKEY_BYTES)
        .take(count)
        .map(|chunk| {
            let mut key = [0u8; PUBKEY_BYTES];
            key.copy_from_slice(chunk);
            Pubkey::new_from_array(key)
        })
        .collect()
}

fn pack_pubkeys(keys: &[Pubkey], dst: &mut [u8]) {
    dst.fill(0);
    for (chunk, key) in dst.chunks_exact_mut(PUBKEY_BYTES).zip(keys) {
        chunk.copy_from_slice(key.as_ref());
    }
}

impl Pack for Raffle {
    const LEN: usize = 1 + 1 + 32 + 32 + 32 + 8 + 4 + 8 + 8 + 1 + 8 + 8 + 32 + 1 + 8 + 4 + PLAYERS_LEN;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, Raffle::LEN];
        let (
            is_initialized,
            bump,
            authority,
            coordinator,
            key_hash,
            subscription_id,
            callback_gas_limit,
            entrance_fee,
            interval,
            state,
            pool_balance,
            last_timestamp,
            recent_winner,
            has_pending,
            pending_request_id,
            player_count,
            players,
        ) = array_refs![src, 1, 1, 32, 32, 32, 8, 4, 8, 8, 1, 8, 8, 32, 1, 8, 4, PLAYERS_LEN];

        let player_count = u32::from_le_bytes(*player_count) as usize;
        if player_count > MAX_PLAYERS {
            return Err(ProgramError::InvalidAccountData);
        }

        Ok(Raffle {
            is_initialized: is_initialized[0] != 0,
            bump: bump[0],
            authority: Pubkey::new_from_array(*authority),
            config: RaffleConfig {
                entrance_fee: u64::from_le_bytes(*entrance_fee),
                interval: UnixTimestamp::from_le_bytes(*interval),
                coordinator: Pubkey::new_from_array(*coordinator),
                key_hash: *key_hash,
                subscription_id: u64::from_le_bytes(*subscription_id),
                callback_gas_limit: u32::from_le_bytes(*callback_gas_limit),
            },
            state: RaffleState::try_from(state[0])?,
            players: unpack_pubkeys(players, player_count),
            pool_balance: u64::from_le_bytes(*pool_balance),
            last_timestamp: UnixTimestamp::from_le_bytes(*last_timestamp),
            recent_winner: Pubkey::new_from_array(*recent_winner),
            pending_request_id: match has_pending[0] {
                0 => None,
                _ => Some(u64::from_le_bytes(*pending_request_id)),
            },
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, Raffle::LEN];
        let (
            is_initialized_dst,
            bump_dst,
            authority_dst,
            coordinator_dst,
            key_hash_dst,
            subscription_id_dst,
            callback_gas_limit_dst,
            entrance_fee_dst,
            interval_dst,
            state_dst,
            pool_balance_dst,
            last_timestamp_dst,
            recent_winner_dst,
            has_pending_dst,
            pending_request_id_dst,
            player_count_dst,
            players_dst,
        ) = mut_array_refs![dst, 1, 1, 32, 32, 32, 8, 4, 8, 8, 1, 8, 8, 32, 1, 8, 4, PLAYERS_LEN];

        is_initialized_dst[0] = self.is_initialized as u8;
        bump_dst[0] = self.bump;
        authority_dst.copy_from_slice(self.authority.as_ref());
        coordinator_dst.copy_from_slice(self.config.coordinator.as_ref());
        *key_hash_dst = self.config.key_hash;
        *subscription_id_dst = self.config.subscription_id.to_le_bytes();
        *callback_gas_limit_dst = self.config.callback_gas_limit.to_le_bytes();
        *entrance_fee_dst = self.config.entrance_fee.to_le_bytes();
        *interval_dst = self.config.interval.to_le_bytes();
        state_dst[0] = self.state.into();
        *pool_balance_dst = self.pool_balance.to_le_bytes();
        *last_timestamp_dst = self.last_timestamp.to_le_bytes();
        recent_winner_dst.copy_from_slice(self.recent_winner.as_ref());
        has_pending_dst[0] = self.pending_request_id.is_some() as u8;
        *pending_request_id_dst = self.pending_request_id.unwrap_or_default().to_le_bytes();
        *player_count_dst = (self.players.len() as u32).to_le_bytes();
        pack_pubkeys(&self.players, players_dst);
    }
}

impl Subscription {
    fn unpack_from(src: &[u8; SUBSCRIPTION_LEN]) -> Result<Self, ProgramError> {
        let (id, owner, balance, consumer_count, consumers) =
            array_refs![src, 8, 32, 8, 1, PUBKEY_BYTES * MAX_CONSUMERS];
        let consumer_count = consumer_count[0] as usize;
        if consumer_count > MAX_CONSUMERS {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(Subscription {
            id: u64::from_le_bytes(*id),
            owner: Pubkey::new_from_array(*owner),
            balance: u64::from_le_bytes(*balance),
            consumers: unpack_pubkeys(consumers, consumer_count),
        })
    }

    fn pack_into(&self, dst: &mut [u8; SUBSCRIPTION_LEN]) {
        let (id_dst, owner_dst, balance_dst, consumer_count_dst, consumers_dst) =
            mut_array_refs![dst, 8, 32, 8, 1, PUBKEY_BYTES * MAX_CONSUMERS];
        *id_dst = self.id.to_le_bytes();
        owner_dst.copy_from_slice(self.owner.as_ref());
        *balance_dst = self.balance.to_le_bytes();
        consumer_count_dst[0] = self.consumers.len() as u8;
        pack_pubkeys(&self.consumers, consumers_dst);
    }
}

impl PendingRequest {
    fn unpack_from(src: &[u8; REQUEST_LEN]) -> Self {
        let (
            request_id,
            subscription_id,
            consumer,
            key_hash,
            request_confirmations,
            callback_gas_limit,
            num_words,
        ) = array_refs![src, 8, 8, 32, 32, 2, 4, 4];
        PendingRequest {
            request_id: u64::from_le_bytes(*request_id),
            subscription_id: u64::from_le_bytes(*subscription_id),
            consumer: Pubkey::new_from_array(*consumer),
            key_hash: *key_hash,
            request_confirmations: u16::from_le_bytes(*request_confirmations),
            callback_gas_limit: u32::from_le_bytes(*callback_gas_limit),
            num_words: u32::from_le_bytes(*num_words),
        }
    }

    fn pack_into(&self, dst: &mut [u8; REQUEST_LEN]) {
        let (
            request_id_dst,
            subscription_id_dst,
            consumer_dst,
            key_hash_dst,
            request_confirmations_dst,
            callback_gas_limit_dst,
            num_words_dst,
        ) = mut_array_refs![dst, 8, 8, 32, 32, 2, 4, 4];
        *request_id_dst = self.request_id.to_le_bytes();
        *subscription_id_dst = self.subscription_id.to_le_bytes();
        consumer_dst.copy_from_slice(self.consumer.as_ref());
        *key_hash_dst = self.key_hash;
        *request_confirmations_dst = self.request_confirmations.to_le_bytes();
        *callback_gas_limit_dst = self.callback_gas_limit.to_le_bytes();
        *num_words_dst = self.num_words.to_le_bytes();
    }
}

impl Pack for VrfCoordinator {
    const LEN: usize = 1 + 1 + 32 + 8 + 8 + 8 + 8 + 1 + SUBSCRIPTIONS_LEN + 1 + REQUESTS_LEN;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, VrfCoordinator::LEN];
        let (
            is_initialized,
            bump,
            authority,
            base_fee,
            fee_per_word,
            next_subscription_id,
            next_request_id,
            subscription_count,
            subscriptions,
            request_count,
            requests,
        ) = array_refs![src, 1, 1, 32, 8, 8, 8, 8, 1, SUBSCRIPTIONS_LEN, 1, REQUESTS_LEN];

        let subscription_count = subscription_count[0] as usize;
        let request_count = request_count[0] as usize;
        if subscription_count > MAX_SUBSCRIPTIONS || request_count > MAX_PENDING_REQUESTS {
            return Err(ProgramError::InvalidAccountData);
        }

        let subscriptions = subscriptions
            .chunks_exact(SUBSCRIPTION_LEN)
            .take(subscription_count)
            .map(|chunk| Subscription::unpack_from(array_ref![chunk, 0, SUBSCRIPTION_LEN]))
            .collect::<Result<Vec<_>, _>>()?;
        let requests = requests
            .chunks_exact(REQUEST_LEN)
            .take(request_count)
            .map(|chunk| PendingRequest::unpack_from(array_ref![chunk, 0, REQUEST_LEN]))
            .collect();

        Ok(VrfCoordinator {
            is_initialized: is_initialized[0] != 0,
            bump: bump[0],
            authority: Pubkey::new_from_array(*authority),
            base_fee: u64::from_le_bytes(*base_fee),
            fee_per_word: u64::from_le_bytes(*fee_per_word),
            next_subscription_id: u64::from_le_bytes(*next_subscription_id),
            next_request_id: u64::from_le_bytes(*next_request_id),
            subscriptions,
            requests,
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, VrfCoordinator::LEN];
        let (
            is_initialized_dst,
            bump_dst,
            authority_dst,
            base_fee_dst,
            fee_per_word_dst,
            next_subscription_id_dst,
            next_request_id_dst,
            subscription_count_dst,
            subscriptions_dst,
            request_count_dst,
            requests_dst,
        ) = mut_array_refs![dst, 1, 1, 32, 8, 8, 8, 8, 1, SUBSCRIPTIONS_LEN, 1, REQUESTS_LEN];

        is_initialized_dst[0] = self.is_initialized as u8;
        bump_dst[0] = self.bump;
        authority_dst.copy_from_slice(self.authority.as_ref());
        *base_fee_dst = self.base_fee.to_le_bytes();
        *fee_per_word_dst = self.fee_per_word.to_le_bytes();
        *next_subscription_id_dst = self.next_subscription_id.to_le_bytes();
        *next_request_id_dst = self.next_request_id.to_le_bytes();

        subscription_count_dst[0] = self.subscriptions.len() as u8;
        subscriptions_dst.fill(0);
        for (chunk, subscription) in subscriptions_dst
            .chunks_exact_mut(SUBSCRIPTION_LEN)
            .zip(&self.subscriptions)
        {
            subscription.pack_into(array_mut_ref![chunk, 0, SUBSCRIPTION_LEN]);
        }

        request_count_dst[0] = self.requests.len() as u8;
        requests_dst.fill(0);
        for (chunk, request) in requests_dst.chunks_exact_mut(REQUEST_LEN).zip(&self.requests) {
            request.pack_into(array_mut_ref![chunk, 0, REQUEST_LEN]);
        }
    }
}
