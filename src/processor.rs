use solana_program::{
    account_info::{next_account_info, AccountInfo},
    clock::Clock,
    entrypoint::ProgramResult,
    msg,
    program::set_return_data,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack},
    pubkey::Pubkey,
    sysvar::Sysvar,
};

use crate::{
    error::RaffleError,
    events::RaffleEvent,
    gateway::RandomWord,
    instruction::RaffleInstruction,
    state::{Raffle, RaffleConfig, VrfCoordinator},
    utils::{
        create_pda_account, find_coordinator_address, find_raffle_address, pay_out,
        transfer_lamports, COORDINATOR_SEED, RAFFLE_SEED,
    },
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::InitializeCoordinator {
                base_fee,
                fee_per_word,
            } => {
                msg!("Instruction: InitializeCoordinator");
                Self::process_initialize_coordinator(accounts, base_fee, fee_per_word, program_id)
            }
            RaffleInstruction::CreateSubscription => {
                msg!("Instruction: CreateSubscription");
                Self::process_create_subscription(accounts, program_id)
            }
            RaffleInstruction::FundSubscription {
                subscription_id,
                amount,
            } => {
                msg!("Instruction: FundSubscription");
                Self::process_fund_subscription(accounts, subscription_id, amount, program_id)
            }
            RaffleInstruction::AddConsumer {
                subscription_id,
                consumer,
            } => {
                msg!("Instruction: AddConsumer");
                Self::process_add_consumer(accounts, subscription_id, consumer, program_id)
            }
            RaffleInstruction::InitializeRaffle {
                entrance_fee,
                interval,
                key_hash,
                subscription_id,
                callback_gas_limit,
            } => {
                msg!("Instruction: InitializeRaffle");
                let config = RaffleConfig {
                    entrance_fee,
                    interval,
                    // filled in from the coordinator account
                    coordinator: Pubkey::default(),
                    key_hash,
                    subscription_id,
                    callback_gas_limit,
                };
                Self::process_initialize_raffle(accounts, config, program_id)
            }
            RaffleInstruction::EnterRaffle { payment } => {
                msg!("Instruction: EnterRaffle");
                Self::process_enter_raffle(accounts, payment, program_id)
            }
            RaffleInstruction::CheckUpkeep => {
                msg!("Instruction: CheckUpkeep");
                Self::process_check_upkeep(accounts, program_id)
            }
            RaffleInstruction::PerformUpkeep => {
                msg!("Instruction: PerformUpkeep");
                Self::process_perform_upkeep(accounts, program_id)
            }
            RaffleInstruction::FulfillRandomWords { request_id } => {
                msg!("Instruction: FulfillRandomWords");
                Self::process_fulfill_random_words(accounts, request_id, None, program_id)
            }
            RaffleInstruction::FulfillRandomWordsWithOverride { request_id, words } => {
                msg!("Instruction: FulfillRandomWordsWithOverride");
                Self::process_fulfill_random_words(accounts, request_id, Some(words), program_id)
            }
            RaffleInstruction::ForceReset => {
                msg!("Instruction: ForceReset");
                Self::process_force_reset(accounts, program_id)
            }
        }
    }

    fn process_initialize_coordinator(
        accounts: &[AccountInfo],
        base_fee: u64,
        fee_per_word: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let authority = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;

        if !authority.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let (coordinator_address, bump) = find_coordinator_address(program_id);
        if coordinator_address != *coordinator_info.key {
            msg!("Coordinator account is not the program derived address");
            return Err(ProgramError::InvalidSeeds);
        }
        if !coordinator_info.data_is_empty() {
            return Err(fail(RaffleError::AlreadyInitialized));
        }

        create_pda_account(
            authority,
            coordinator_info,
            system_program,
            VrfCoordinator::LEN,
            &[COORDINATOR_SEED, &[bump]],
            program_id,
        )?;

        let coordinator = VrfCoordinator::new(*authority.key, base_fee, fee_per_word, bump);
        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        msg!(
            "Coordinator initialized: base fee {}, fee per word {}",
            base_fee,
            fee_per_word
        );
        Ok(())
    }

    fn process_create_subscription(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;

        if !owner.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;
        let event = coordinator.create_subscription(*owner.key).map_err(fail)?;

        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        event.emit();
        Ok(())
    }

    fn process_fund_subscription(
        accounts: &[AccountInfo],
        subscription_id: u64,
        amount: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let funder = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;

        if !funder.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;
        let event = coordinator
            .fund_subscription(subscription_id, amount)
            .map_err(fail)?;

        transfer_lamports(funder, coordinator_info, system_program, amount)?;

        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        event.emit();
        Ok(())
    }

    fn process_add_consumer(
        accounts: &[AccountInfo],
        subscription_id: u64,
        consumer: Pubkey,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;

        if !owner.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;
        let event = coordinator
            .add_consumer(subscription_id, owner.key, consumer)
            .map_err(fail)?;

        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        event.emit();
        Ok(())
    }

    fn process_initialize_raffle(
        accounts: &[AccountInfo],
        mut config: RaffleConfig,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let authority = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;

        if !authority.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let (raffle_address, bump) = find_raffle_address(program_id);
        if raffle_address != *raffle_info.key {
            msg!("Raffle account is not the program derived address");
            return Err(ProgramError::InvalidSeeds);
        }
        if !raffle_info.data_is_empty() {
            return Err(fail(RaffleError::AlreadyInitialized));
        }

        let coordinator = load_coordinator(coordinator_info, program_id)
            .map_err(|_| fail(RaffleError::InvalidCoordinator))?;
        coordinator
            .subscription(config.subscription_id)
            .map_err(fail)?;
        config.coordinator = *coordinator_info.key;

        let now = Clock::get()?.unix_timestamp;
        let raffle = Raffle::new(*authority.key, config, now, bump).map_err(fail)?;

        create_pda_account(
            authority,
            raffle_info,
            system_program,
            Raffle::LEN,
            &[RAFFLE_SEED, &[bump]],
            program_id,
        )?;
        Raffle::pack(raffle, &mut raffle_info.try_borrow_mut_data()?)?;
        msg!(
            "Raffle initialized: entrance fee {}, interval {}s, subscription {}",
            config.entrance_fee,
            config.interval,
            config.subscription_id
        );
        Ok(())
    }

    fn process_enter_raffle(
        accounts: &[AccountInfo],
        payment: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let player = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let system_program = next_account_info(account_info_iter)?;

        if !player.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut raffle = load_raffle(raffle_info, program_id)?;
        let event = raffle.enter(*player.key, payment).map_err(fail)?;

        transfer_lamports(player, raffle_info, system_program, payment)?;

        Raffle::pack(raffle, &mut raffle_info.try_borrow_mut_data()?)?;
        event.emit();
        Ok(())
    }

    fn process_check_upkeep(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let raffle_info = next_account_info(account_info_iter)?;

        let raffle = load_raffle(raffle_info, program_id)?;
        let now = Clock::get()?.unix_timestamp;
        let upkeep_needed = raffle.check_upkeep(now);

        msg!("Upkeep needed: {}", upkeep_needed);
        set_return_data(&[upkeep_needed as u8]);
        Ok(())
    }

    fn process_perform_upkeep(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let keeper = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;

        if !keeper.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut raffle = load_raffle(raffle_info, program_id)?;
        if raffle.config.coordinator != *coordinator_info.key {
            return Err(fail(RaffleError::InvalidCoordinator));
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;

        let now = Clock::get()?.unix_timestamp;
        let event = raffle
            .perform_upkeep(raffle_info.key, now, &mut coordinator)
            .map_err(fail)?;
        let subscription_id = raffle.config.subscription_id;

        Raffle::pack(raffle, &mut raffle_info.try_borrow_mut_data()?)?;
        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        if let RaffleEvent::RequestedRaffleWinner { request_id } = event {
            RaffleEvent::RandomWordsRequested {
                request_id,
                subscription_id,
                consumer: *raffle_info.key,
            }
            .emit();
        }
        event.emit();
        Ok(())
    }

    fn process_fulfill_random_words(
        accounts: &[AccountInfo],
        request_id: u64,
        override_words: Option<Vec<RandomWord>>,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let winner_info = next_account_info(account_info_iter)?;

        if !oracle.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;
        if coordinator.authority != *oracle.key {
            return Err(fail(RaffleError::NotAuthority));
        }
        let mut raffle = load_raffle(raffle_info, program_id)?;
        if raffle.config.coordinator != *coordinator_info.key {
            return Err(fail(RaffleError::InvalidCoordinator));
        }

        let words = coordinator
            .fulfill(request_id, raffle_info.key, override_words)
            .map_err(fail)?;

        let now = Clock::get()?.unix_timestamp;
        let event = raffle
            .fulfill_random_words(request_id, &words, now, |winner, prize| {
                pay_out(raffle_info, winner_info, winner, prize)
            })
            .map_err(fail)?;

        Raffle::pack(raffle, &mut raffle_info.try_borrow_mut_data()?)?;
        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        RaffleEvent::RandomWordsFulfilled {
            request_id,
            consumer: *raffle_info.key,
        }
        .emit();
        event.emit();
        Ok(())
    }

    fn process_force_reset(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let authority = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;

        if !authority.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let mut raffle = load_raffle(raffle_info, program_id)?;
        if raffle.config.coordinator != *coordinator_info.key {
            return Err(fail(RaffleError::InvalidCoordinator));
        }
        let mut coordinator = load_coordinator(coordinator_info, program_id)?;

        let request_id = raffle.force_reset(authority.key).map_err(fail)?;
        if !coordinator.cancel_request(request_id) {
            msg!("Request {} was no longer pending", request_id);
        }

        Raffle::pack(raffle, &mut raffle_info.try_borrow_mut_data()?)?;
        VrfCoordinator::pack(coordinator, &mut coordinator_info.try_borrow_mut_data()?)?;
        RaffleEvent::RoundReset { request_id }.emit();
        Ok(())
    }
}

fn fail(err: RaffleError) -> ProgramError {
    msg!("Error: {}", err);
    err.into()
}

fn load_raffle(raffle_info: &AccountInfo, program_id: &Pubkey) -> Result<Raffle, ProgramError> {
    if raffle_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let raffle = Raffle::unpack_unchecked(&raffle_info.try_borrow_data()?)?;
    if !raffle.is_initialized() {
        return Err(fail(RaffleError::NotInitialized));
    }
    Ok(raffle)
}

fn load_coordinator(
    coordinator_info: &AccountInfo,
    program_id: &Pubkey,
) -> Result<VrfCoordinator, ProgramError> {
    if coordinator_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let coordinator = VrfCoordinator::unpack_unchecked(&coordinator_info.try_borrow_data()?)?;
    if !coordinator.is_initialized() {
        return Err(fail(RaffleError::NotInitialized));
    }
    Ok(coordinator)
}
