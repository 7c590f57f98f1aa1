//! Round state machine: entries, the upkeep gate, randomness requests and
//! settlement. Every transition either completes or leaves the raffle untouched.

use solana_program::{clock::UnixTimestamp, pubkey::Pubkey};

use crate::{
    error::RaffleError,
    events::RaffleEvent,
    gateway::{winner_index, RandomWord, RandomnessGateway, RandomnessRequest},
    state::{Raffle, RaffleState, MAX_PLAYERS, NUM_WORDS, REQUEST_CONFIRMATIONS},
};

impl Raffle {
    /// Add `player` to the current round. Any payment at or above the
    /// entrance fee is accepted and retained in full.
    pub fn enter(&mut self, player: Pubkey, payment: u64) -> Result<RaffleEvent, RaffleError> {
        if self.state != RaffleState::Open {
            return Err(RaffleError::RoundNotOpen);
        }
        if payment < self.config.entrance_fee {
            return Err(RaffleError::InsufficientPayment);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(RaffleError::RoundFull);
        }
        let pool_balance = self
            .pool_balance
            .checked_add(payment)
            .ok_or(RaffleError::Overflow)?;

        self.players.push(player);
        self.pool_balance = pool_balance;
        Ok(RaffleEvent::RaffleEnter { player, payment })
    }

    /// Whether the round may be closed at `now`.
    pub fn check_upkeep(&self, now: UnixTimestamp) -> bool {
        let is_open = self.state == RaffleState::Open;
        let time_passed = now.saturating_sub(self.last_timestamp) >= self.config.interval;
        let has_players = !self.players.is_empty();
        let has_balance = self.pool_balance > 0;
        is_open && time_passed && has_players && has_balance
    }

    /// Close entries and request randomness for the round.
    ///
    /// The round is marked calculating before the gateway is called; if the
    /// gateway refuses the request the round is reopened and its error returned.
    pub fn perform_upkeep<G: RandomnessGateway>(
        &mut self,
        consumer: &Pubkey,
        now: UnixTimestamp,
        gateway: &mut G,
    ) -> Result<RaffleEvent, RaffleError> {
        if !self.check_upkeep(now) {
            return Err(RaffleError::UpkeepNotNeeded {
                balance: self.pool_balance,
                players: self.players.len() as u32,
                state: self.state.into(),
            });
        }

        self.state = RaffleState::Calculating;
        let request = RandomnessRequest {
            key_hash: self.config.key_hash,
            subscription_id: self.config.subscription_id,
            request_confirmations: REQUEST_CONFIRMATIONS,
            callback_gas_limit: self.config.callback_gas_limit,
            num_words: NUM_WORDS,
        };
        match gateway.request_random_words(consumer, &request) {
            Ok(request_id) => {
                self.pending_request_id = Some(request_id);
                Ok(RaffleEvent::RequestedRaffleWinner { request_id })
            }
            Err(err) => {
                self.state = RaffleState::Open;
                Err(err)
            }
        }
    }

    /// Settle the round with the words delivered for `request_id`.
    ///
    /// `pay` moves the prize to the winner. If it fails the round is left
    /// calculating with the request still pending.
    pub fn fulfill_random_words<F>(
        &mut self,
        request_id: u64,
        random_words: &[RandomWord],
        now: UnixTimestamp,
        pay: F,
    ) -> Result<RaffleEvent, RaffleError>
    where
        F: FnOnce(&Pubkey, u64) -> Result<(), RaffleError>,
    {
        if self.state != RaffleState::Calculating || self.pending_request_id != Some(request_id) {
            return Err(RaffleError::UnrecognizedRequest);
        }
        let word = random_words.first().ok_or(RaffleError::InvalidRandomWords)?;
        let index =
            winner_index(word, self.players.len()).ok_or(RaffleError::IndexOutOfRange)?;
        let winner = self.players[index];
        let prize = self.pool_balance;

        pay(&winner, prize).map_err(|_| RaffleError::TransferFailed)?;

        self.recent_winner = winner;
        self.players.clear();
        self.pool_balance = 0;
        self.last_timestamp = now;
        self.state = RaffleState::Open;
        self.pending_request_id = None;
        Ok(RaffleEvent::WinnerPicked { winner, prize })
    }

    /// Abandon the in-flight request of a stuck round.
    ///
    /// Entries and pool are kept, so the same round is drawn again by the next
    /// upkeep. Returns the abandoned request id.
    pub fn force_reset(&mut self, caller: &Pubkey) -> Result<u64, RaffleError> {
        if *caller != self.authority {
            return Err(RaffleError::NotAuthority);
        }
        let request_id = match (self.state, self.pending_request_id) {
            (RaffleState::Calculating, Some(request_id)) => request_id,
            _ => return Err(RaffleError::RoundNotCalculating),
        };
        self.state = RaffleState::Open;
        self.pending_request_id = None;
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::word_from_u64, state::RaffleConfig, state::VrfCoordinator};

    const FEE: u64 = 10_000_000;
    const INTERVAL: UnixTimestamp = 30;
    const START: UnixTimestamp = 1_700_000_000;

    struct Fixture {
        raffle: Raffle,
        address: Pubkey,
        coordinator: VrfCoordinator,
    }

    fn setup() -> Fixture {
        let owner = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let mut coordinator = VrfCoordinator::new(Pubkey::new_unique(), 250_000, 0, 255);
        coordinator.create_subscription(owner).unwrap();
        coordinator.fund_subscription(1, 2_000_000_000).unwrap();
        coordinator.add_consumer(1, &owner, address).unwrap();

        let config = RaffleConfig {
            entrance_fee: FEE,
            interval: INTERVAL,
            coordinator: Pubkey::new_unique(),
            key_hash: [9u8; 32],
            subscription_id: 1,
            callback_gas_limit: 500_000,
        };
        Fixture {
            raffle: Raffle::new(Pubkey::new_unique(), config, START, 254).unwrap(),
            address,
            coordinator,
        }
    }

    fn ok_pay(_: &Pubkey, _: u64) -> Result<(), RaffleError> {
        Ok(())
    }

    #[test]
    fn test_enter_below_fee_fails_without_mutation() {
        let mut f = setup();
        for payment in [0, 1, FEE / 2, FEE - 1] {
            assert_eq!(
                f.raffle.enter(Pubkey::new_unique(), payment),
                Err(RaffleError::InsufficientPayment)
            );
        }
        assert_eq!(f.raffle.number_of_players(), 0);
        assert_eq!(f.raffle.pool_balance(), 0);
    }

    #[test]
    fn test_enter_records_players_and_pool() {
        let mut f = setup();
        let player = Pubkey::new_unique();

        let event = f.raffle.enter(player, FEE).unwrap();
        assert_eq!(event, RaffleEvent::RaffleEnter { player, payment: FEE });

        f.raffle.enter(Pubkey::new_unique(), FEE * 3).unwrap();
        f.raffle.enter(player, FEE).unwrap();

        assert_eq!(f.raffle.number_of_players(), 3);
        assert_eq!(f.raffle.pool_balance(), FEE * 5);
        assert_eq!(f.raffle.player(0), Ok(player));
        assert_eq!(f.raffle.player(2), Ok(player));
        assert_eq!(f.raffle.player(3), Err(RaffleError::IndexOutOfRange));
    }

    #[test]
    fn test_enter_fails_when_round_full() {
        let mut f = setup();
        for _ in 0..MAX_PLAYERS {
            f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        }
        assert_eq!(
            f.raffle.enter(Pubkey::new_unique(), FEE),
            Err(RaffleError::RoundFull)
        );
        assert_eq!(f.raffle.pool_balance(), FEE * MAX_PLAYERS as u64);
    }

    #[test]
    fn test_check_upkeep_false_without_players() {
        let f = setup();
        assert!(!f.raffle.check_upkeep(START + INTERVAL + 1));
        assert!(!f.raffle.check_upkeep(START + INTERVAL * 1_000));
    }

    #[test]
    fn test_check_upkeep_interval_boundary() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();

        assert!(!f.raffle.check_upkeep(START + INTERVAL - 1));
        assert!(f.raffle.check_upkeep(START + INTERVAL));
        assert!(f.raffle.check_upkeep(START + INTERVAL + 1));
        // clock behind the last settlement
        assert!(!f.raffle.check_upkeep(START - 1));
    }

    #[test]
    fn test_check_upkeep_false_when_calculating() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        assert_eq!(f.raffle.raffle_state(), RaffleState::Calculating);
        assert!(!f.raffle.check_upkeep(START + INTERVAL * 2));
    }

    #[test]
    fn test_check_upkeep_false_with_empty_pool() {
        let mut f = setup();
        f.raffle.players.push(Pubkey::new_unique());
        assert!(!f.raffle.check_upkeep(START + INTERVAL));
    }

    #[test]
    fn test_perform_upkeep_not_needed_carries_diagnostics() {
        let mut f = setup();
        assert_eq!(
            f.raffle.perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator),
            Err(RaffleError::UpkeepNotNeeded {
                balance: 0,
                players: 0,
                state: 0,
            })
        );

        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        assert_eq!(
            f.raffle.perform_upkeep(&f.address, START + INTERVAL - 1, &mut f.coordinator),
            Err(RaffleError::UpkeepNotNeeded {
                balance: FEE,
                players: 1,
                state: 0,
            })
        );
        assert!(f.coordinator.requests.is_empty());
    }

    #[test]
    fn test_perform_upkeep_requests_randomness() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();

        let event = f
            .raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        assert_eq!(event, RaffleEvent::RequestedRaffleWinner { request_id: 1 });
        assert_eq!(f.raffle.raffle_state(), RaffleState::Calculating);
        assert_eq!(f.raffle.pending_request_id(), Some(1));

        let request = f.coordinator.pending_request(1).unwrap();
        assert_eq!(request.consumer, f.address);
        assert_eq!(request.key_hash, [9u8; 32]);
        assert_eq!(request.num_words, NUM_WORDS);
        assert_eq!(request.request_confirmations, REQUEST_CONFIRMATIONS);
    }

    #[test]
    fn test_perform_upkeep_twice_fails() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        assert_eq!(
            f.raffle.perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator),
            Err(RaffleError::UpkeepNotNeeded {
                balance: FEE,
                players: 1,
                state: 1,
            })
        );
        assert_eq!(f.coordinator.requests.len(), 1);
    }

    #[test]
    fn test_perform_upkeep_reopens_round_when_gateway_refuses() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        let stranger = Pubkey::new_unique();

        assert_eq!(
            f.raffle.perform_upkeep(&stranger, START + INTERVAL, &mut f.coordinator),
            Err(RaffleError::InvalidConsumer)
        );
        assert_eq!(f.raffle.raffle_state(), RaffleState::Open);
        assert_eq!(f.raffle.pending_request_id(), None);
    }

    #[test]
    fn test_enter_blocked_while_calculating() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        assert_eq!(
            f.raffle.enter(Pubkey::new_unique(), FEE),
            Err(RaffleError::RoundNotOpen)
        );
        assert_eq!(f.raffle.number_of_players(), 1);
        assert_eq!(f.raffle.pool_balance(), FEE);
    }

    #[test]
    fn test_fulfill_unknown_request_fails_without_mutation() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();

        // nothing pending yet
        assert_eq!(
            f.raffle
                .fulfill_random_words(1, &[word_from_u64(0)], START + INTERVAL, ok_pay),
            Err(RaffleError::UnrecognizedRequest)
        );

        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();
        let before = f.raffle.clone();
        for request_id in [0, 2, u64::MAX] {
            assert_eq!(
                f.raffle.fulfill_random_words(
                    request_id,
                    &[word_from_u64(0)],
                    START + INTERVAL,
                    ok_pay
                ),
                Err(RaffleError::UnrecognizedRequest)
            );
        }
        assert_eq!(f.raffle, before);
    }

    #[test]
    fn test_fulfill_picks_winner_by_modulo_and_resets() {
        let mut f = setup();
        let players: Vec<Pubkey> = (0..4).map(|_| Pubkey::new_unique()).collect();
        for player in &players {
            f.raffle.enter(*player, FEE).unwrap();
        }
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        let mut paid = None;
        let settled_at = START + INTERVAL + 5;
        let event = f
            .raffle
            .fulfill_random_words(1, &[word_from_u64(10)], settled_at, |winner, amount| {
                paid = Some((*winner, amount));
                Ok(())
            })
            .unwrap();

        assert_eq!(paid, Some((players[2], FEE * 4)));
        assert_eq!(
            event,
            RaffleEvent::WinnerPicked {
                winner: players[2],
                prize: FEE * 4,
            }
        );
        assert_eq!(f.raffle.recent_winner(), players[2]);
        assert_eq!(f.raffle.number_of_players(), 0);
        assert_eq!(f.raffle.pool_balance(), 0);
        assert_eq!(f.raffle.raffle_state(), RaffleState::Open);
        assert_eq!(f.raffle.last_timestamp(), settled_at);
        assert_eq!(f.raffle.pending_request_id(), None);
    }

    #[test]
    fn test_fulfill_accepted_once() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        f.raffle
            .fulfill_random_words(1, &[word_from_u64(3)], START + INTERVAL, ok_pay)
            .unwrap();
        assert_eq!(
            f.raffle
                .fulfill_random_words(1, &[word_from_u64(3)], START + INTERVAL, ok_pay),
            Err(RaffleError::UnrecognizedRequest)
        );
    }

    #[test]
    fn test_failed_transfer_keeps_round_pending() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();
        let before = f.raffle.clone();

        let result = f.raffle.fulfill_random_words(
            1,
            &[word_from_u64(0)],
            START + INTERVAL,
            |_, _| Err(RaffleError::InvalidConsumer),
        );

        assert_eq!(result, Err(RaffleError::TransferFailed));
        assert_eq!(f.raffle, before);
        assert_eq!(f.raffle.raffle_state(), RaffleState::Calculating);

        // a retry with a working payout settles the round
        f.raffle
            .fulfill_random_words(1, &[word_from_u64(0)], START + INTERVAL, ok_pay)
            .unwrap();
        assert_eq!(f.raffle.raffle_state(), RaffleState::Open);
    }

    #[test]
    fn test_fulfill_requires_a_word() {
        let mut f = setup();
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();
        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();

        assert_eq!(
            f.raffle.fulfill_random_words(1, &[], START + INTERVAL, ok_pay),
            Err(RaffleError::InvalidRandomWords)
        );
    }

    #[test]
    fn test_single_entrant_round_trip() {
        let mut f = setup();
        let entrant = Pubkey::new_unique();
        f.raffle.enter(entrant, FEE).unwrap();
        assert!(f.raffle.check_upkeep(START + INTERVAL));

        let request_id = match f
            .raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap()
        {
            RaffleEvent::RequestedRaffleWinner { request_id } => request_id,
            other => panic!("unexpected event {:?}", other),
        };
        let words = f.coordinator.fulfill(request_id, &f.address, None).unwrap();

        let mut received = 0;
        f.raffle
            .fulfill_random_words(request_id, &words, START + INTERVAL, |winner, amount| {
                assert_eq!(*winner, entrant);
                received += amount;
                Ok(())
            })
            .unwrap();

        assert_eq!(received, FEE);
        assert_eq!(f.raffle.recent_winner(), entrant);
        assert_eq!(f.raffle.number_of_players(), 0);
        assert_eq!(f.raffle.raffle_state(), RaffleState::Open);
    }

    #[test]
    fn test_force_reset_reopens_stuck_round() {
        let mut f = setup();
        let authority = f.raffle.authority;
        f.raffle.enter(Pubkey::new_unique(), FEE).unwrap();

        assert_eq!(
            f.raffle.force_reset(&authority),
            Err(RaffleError::RoundNotCalculating)
        );

        f.raffle
            .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator)
            .unwrap();
        assert_eq!(
            f.raffle.force_reset(&Pubkey::new_unique()),
            Err(RaffleError::NotAuthority)
        );

        assert_eq!(f.raffle.force_reset(&authority), Ok(1));
        assert_eq!(f.raffle.raffle_state(), RaffleState::Open);
        assert_eq!(f.raffle.pending_request_id(), None);
        assert_eq!(f.raffle.number_of_players(), 1);
        assert_eq!(f.raffle.pool_balance(), FEE);

        // the abandoned id can no longer settle the round
        assert_eq!(
            f.raffle
                .fulfill_random_words(1, &[word_from_u64(0)], START + INTERVAL, ok_pay),
            Err(RaffleError::UnrecognizedRequest)
        );
        // and the next upkeep draws again
        assert_eq!(
            f.raffle
                .perform_upkeep(&f.address, START + INTERVAL, &mut f.coordinator),
            Ok(RaffleEvent::RequestedRaffleWinner { request_id: 2 })
        );
    }
}
