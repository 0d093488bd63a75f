//! Call bindings for the bundler and token contracts
//!
//! Only the functions these flows invoke are bound.

use ethers::prelude::abigen;

abigen!(
    BundlerContract,
    r#"[
        function swapAndDistribute(uint256 maxTx, uint256 fee, address token) external payable
        function sendBatch(uint256 amount) external payable
        function getRecipientCount() external view returns (uint256)
    ]"#
);

abigen!(
    TokenContract,
    r#"[
        function openTrading() external
        function decimals() external view returns (uint8)
    ]"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{AbiDecode, AbiEncode};
    use ethers::types::{Address, U256};

    #[test]
    fn test_open_trading_selector() {
        let data = OpenTradingCall.encode();
        assert_eq!(data.len(), 4);
        assert_eq!(&data[..], &ethers::utils::id("openTrading()")[..]);
    }

    #[test]
    fn test_swap_and_distribute_layout() {
        let token: Address = "0x94Af502a5583d37a9da1b738A19Cc8D02fA4D402".parse().unwrap();
        let call = SwapAndDistributeCall {
            max_tx: U256::from(7),
            fee: U256::from(9),
            token,
        };
        let data = call.clone().encode();

        assert_eq!(data.len(), 4 + 32 * 3);
        assert_eq!(
            &data[..4],
            &ethers::utils::id("swapAndDistribute(uint256,uint256,address)")[..]
        );
        assert_eq!(SwapAndDistributeCall::decode(&data).unwrap(), call);
    }

    #[test]
    fn test_decimals_return_decoding() {
        let raw = U256::from(18).encode();
        assert_eq!(DecimalsReturn::decode(raw).unwrap().0, 18);
    }
}
