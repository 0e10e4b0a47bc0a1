//! ABI of the collection contract.

use alloy_sol_types::sol;

sol! {
    /// Owner mint entry point of the `JustApes` ERC-721 collection.
    ///
    /// Restricted to the contract owner, which is the minter wallet
    /// configured on the server.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IJustApes {
        function ownerMint(address to, uint256 quantity) external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn owner_mint_calldata_is_selector_plus_two_words() {
        let call = IJustApes::ownerMintCall {
            to: Address::repeat_byte(0x11),
            quantity: U256::from(3),
        };
        let encoded = call.abi_encode();
        assert_eq!(IJustApes::ownerMintCall::SIGNATURE, "ownerMint(address,uint256)");
        assert_eq!(&encoded[..4], IJustApes::ownerMintCall::SELECTOR.as_slice());
        assert_eq!(encoded.len(), 4 + 64);
        assert_eq!(encoded[4 + 63], 3);
    }
}
