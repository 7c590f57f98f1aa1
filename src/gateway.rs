//! Randomness gateway: the seam the raffle requests randomness through, and the
//! coordinator that issues requests and delivers each one exactly once.

use solana_program::{keccak, msg, pubkey::Pubkey};

use crate::{
    error::RaffleError,
    events::RaffleEvent,
    state::{
        PendingRequest, Subscription, VrfCoordinator, MAX_CONSUMERS, MAX_PENDING_REQUESTS,
        MAX_SUBSCRIPTIONS,
    },
};

/// A 256-bit random value, big-endian
pub type RandomWord = [u8; 32];

/// Parameters forwarded to the oracle with every request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomnessRequest {
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

pub trait RandomnessGateway {
    /// Issue a request on behalf of `consumer` and return its id.
    /// Fulfillment arrives later as a separate call.
    fn request_random_words(
        &mut self,
        consumer: &Pubkey,
        request: &RandomnessRequest,
    ) -> Result<u64, RaffleError>;
}

/// Index of the winning entry: `word mod len`, over the full 256 bits
pub fn winner_index(word: &RandomWord, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let modulus = len as u128;
    let rem = word
        .iter()
        .fold(0u128, |acc, byte| ((acc << 8) | *byte as u128) % modulus);
    Some(rem as usize)
}

/// Word whose numeric value is `value`
pub fn word_from_u64(value: u64) -> RandomWord {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Words the coordinator delivers for `request_id` when no override is given
pub fn derive_random_words(request_id: u64, num_words: u32) -> Vec<RandomWord> {
    (0..num_words)
        .map(|index| {
            keccak::hashv(&[request_id.to_le_bytes().as_ref(), index.to_le_bytes().as_ref()])
                .to_bytes()
        })
        .collect()
}

impl VrfCoordinator {
    /// Fee charged against the subscription when `request` is fulfilled
    pub fn fulfillment_fee(&self, request: &PendingRequest) -> Result<u64, RaffleError> {
        self.fee_per_word
            .checked_mul(request.num_words as u64)
            .and_then(|fee| fee.checked_add(self.base_fee))
            .ok_or(RaffleError::Overflow)
    }

    pub fn subscription(&self, subscription_id: u64) -> Result<&Subscription, RaffleError> {
        self.subscriptions
            .iter()
            .find(|s| s.id == subscription_id)
            .ok_or(RaffleError::InvalidSubscription)
    }

    fn subscription_mut(&mut self, subscription_id: u64) -> Result<&mut Subscription, RaffleError> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
            .ok_or(RaffleError::InvalidSubscription)
    }

    pub fn pending_request(&self, request_id: u64) -> Option<&PendingRequest> {
        self.requests.iter().find(|r| r.request_id == request_id)
    }

    pub fn create_subscription(&mut self, owner: Pubkey) -> Result<RaffleEvent, RaffleError> {
        if self.subscriptions.len() >= MAX_SUBSCRIPTIONS {
            return Err(RaffleError::TooManySubscriptions);
        }
        let subscription_id = self.next_subscription_id;
        self.next_subscription_id = subscription_id
            .checked_add(1)
            .ok_or(RaffleError::Overflow)?;
        self.subscriptions.push(Subscription {
            id: subscription_id,
            owner,
            balance: 0,
            consumers: Vec::new(),
        });
        Ok(RaffleEvent::SubscriptionCreated {
            subscription_id,
            owner,
        })
    }

    pub fn fund_subscription(
        &mut self,
        subscription_id: u64,
        amount: u64,
    ) -> Result<RaffleEvent, RaffleError> {
        let subscription = self.subscription_mut(subscription_id)?;
        let old_balance = subscription.balance;
        subscription.balance = old_balance
            .checked_add(amount)
            .ok_or(RaffleError::Overflow)?;
        Ok(RaffleEvent::SubscriptionFunded {
            subscription_id,
            old_balance,
            new_balance: subscription.balance,
        })
    }

    pub fn add_consumer(
        &mut self,
        subscription_id: u64,
        caller: &Pubkey,
        consumer: Pubkey,
    ) -> Result<RaffleEvent, RaffleError> {
        let subscription = self.subscription_mut(subscription_id)?;
        if subscription.owner != *caller {
            return Err(RaffleError::NotAuthority);
        }
        if !subscription.consumers.contains(&consumer) {
            if subscription.consumers.len() >= MAX_CONSUMERS {
                return Err(RaffleError::TooManyConsumers);
            }
            subscription.consumers.push(consumer);
        }
        Ok(RaffleEvent::ConsumerAdded {
            subscription_id,
            consumer,
        })
    }

    /// Consume a pending request and return the words to deliver.
    ///
    /// The request is removed before returning, so a second fulfillment of the
    /// same id fails with `NonexistentRequest`. `override_words`, when given,
    /// must contain exactly the number of words that was requested.
    pub fn fulfill(
        &mut self,
        request_id: u64,
        consumer: &Pubkey,
        override_words: Option<Vec<RandomWord>>,
    ) -> Result<Vec<RandomWord>, RaffleError> {
        let position = self
            .requests
            .iter()
            .position(|r| r.request_id == request_id)
            .ok_or(RaffleError::NonexistentRequest)?;
        let request = self.requests[position];
        if request.consumer != *consumer {
            return Err(RaffleError::InvalidConsumer);
        }

        let words = match override_words {
            Some(words) if words.len() == request.num_words as usize => words,
            Some(_) => return Err(RaffleError::InvalidRandomWords),
            None => derive_random_words(request_id, request.num_words),
        };

        let fee = self.fulfillment_fee(&request)?;
        let subscription = self.subscription_mut(request.subscription_id)?;
        subscription.balance = subscription
            .balance
            .checked_sub(fee)
            .ok_or(RaffleError::InsufficientSubscriptionBalance)?;

        self.requests.remove(position);
        msg!("Request {} fulfilled, charged {} lamports", request_id, fee);
        Ok(words)
    }

    /// Drop a pending request without delivering it. Returns whether it existed.
    pub fn cancel_request(&mut self, request_id: u64) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| r.request_id != request_id);
        self.requests.len() != before
    }
}

impl RandomnessGateway for VrfCoordinator {
    fn request_random_words(
        &mut self,
        consumer: &Pubkey,
        request: &RandomnessRequest,
    ) -> Result<u64, RaffleError> {
        let subscription = self.subscription(request.subscription_id)?;
        if !subscription.consumers.contains(consumer) {
            return Err(RaffleError::InvalidConsumer);
        }
        if request.num_words == 0 {
            return Err(RaffleError::InvalidRandomWords);
        }
        if self.requests.len() >= MAX_PENDING_REQUESTS {
            return Err(RaffleError::TooManyPendingRequests);
        }

        let request_id = self.next_request_id;
        self.next_request_id = request_id.checked_add(1).ok_or(RaffleError::Overflow)?;
        self.requests.push(PendingRequest {
            request_id,
            subscription_id: request.subscription_id,
            consumer: *consumer,
            key_hash: request.key_hash,
            request_confirmations: request.request_confirmations,
            callback_gas_limit: request.callback_gas_limit,
            num_words: request.num_words,
        });
        Ok(request_id)
    }
}
