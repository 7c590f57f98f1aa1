use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{log::sol_log_data, msg, pubkey::Pubkey};

/// Notifications published in the program log.
///
/// Each event is written twice: as a readable `msg!` line and as borsh bytes
/// through `sol_log_data`, prefixed with [`EVENT_TAG`], for off-chain indexers.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleEvent {
    RaffleEnter { player: Pubkey, payment: u64 },
    RequestedRaffleWinner { request_id: u64 },
    WinnerPicked { winner: Pubkey, prize: u64 },
    RoundReset { request_id: u64 },
    SubscriptionCreated { subscription_id: u64, owner: Pubkey },
    SubscriptionFunded { subscription_id: u64, old_balance: u64, new_balance: u64 },
    ConsumerAdded { subscription_id: u64, consumer: Pubkey },
    RandomWordsRequested { request_id: u64, subscription_id: u64, consumer: Pubkey },
    RandomWordsFulfilled { request_id: u64, consumer: Pubkey },
}

pub const EVENT_TAG: &[u8] = b"raffle:event";

/// Prefix of the readable log line, after the runtime's `Program log: `
pub const EVENT_LOG_PREFIX: &str = "Event: ";

impl RaffleEvent {
    /// Fields passed to `sol_log_data`: the tag, then the borsh encoding
    pub fn log_data(&self) -> borsh::io::Result<[Vec<u8>; 2]> {
        Ok([EVENT_TAG.to_vec(), borsh::to_vec(self)?])
    }

    /// Decode the fields written by [`RaffleEvent::emit`]
    pub fn from_log_data(fields: &[&[u8]]) -> Option<Self> {
        match fields {
            [tag, data] if *tag == EVENT_TAG => Self::try_from_slice(data).ok(),
            _ => None,
        }
    }

    pub fn emit(&self) {
        msg!("{}{:?}", EVENT_LOG_PREFIX, self);
        match self.log_data() {
            Ok([tag, data]) => sol_log_data(&[tag.as_slice(), data.as_slice()]),
            Err(err) => msg!("Failed to encode event: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_data_decodes() {
        let event = RaffleEvent::WinnerPicked {
            winner: Pubkey::new_unique(),
            prize: 40_000_000,
        };
        let [tag, data] = event.log_data().unwrap();
        assert_eq!(tag, EVENT_TAG);
        assert_eq!(
            RaffleEvent::from_log_data(&[tag.as_slice(), data.as_slice()]),
            Some(event)
        );
    }

    #[test]
    fn test_foreign_log_data_ignored() {
        let data = borsh::to_vec(&RaffleEvent::RoundReset { request_id: 2 }).unwrap();
        assert_eq!(RaffleEvent::from_log_data(&[b"other", data.as_slice()]), None);
        assert_eq!(RaffleEvent::from_log_data(&[data.as_slice()]), None);
    }
}
