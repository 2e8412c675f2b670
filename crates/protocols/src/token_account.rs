//! Associated token account derivation.

use balance_watch_domain::TokenProgram;
use solana_sdk::pubkey::Pubkey;

/// SPL Token program id.
pub const TOKEN_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// Token-2022 program id.
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Associated token account program id.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Program id owning token accounts of the given family.
pub fn token_program_id(program: TokenProgram) -> Pubkey {
    match program {
        TokenProgram::Token => TOKEN_PROGRAM_ID,
        TokenProgram::Token2022 => TOKEN_2022_PROGRAM_ID,
    }
}

/// Derives the associated token account holding `owner`'s balance of `mint`.
///
/// Seeds are `[owner, token_program, mint]` under the associated token
/// account program. No I/O is performed.
pub fn derive_token_account(owner: &Pubkey, mint: &Pubkey, program: TokenProgram) -> Pubkey {
    let token_program = token_program_id(program);
    let (address, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    );
    address
}
