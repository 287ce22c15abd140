//! Contract interfaces queried by the extractors.

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function totalSupply() external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    /// Rebasing token internal accounting.
    interface IRebasingToken {
        function rebasingCreditsPerToken() external view returns (uint256);
        function creditsBalanceOf(address account) external view returns (uint256);
    }

    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address);
    }

    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);

        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
    }

    /// SushiSwap LP staking registry.
    interface IMasterChef {
        function poolLength() external view returns (uint256);
        function poolInfo(uint256 pid) external view returns (address lpToken, uint256 allocPoint, uint256 lastRewardBlock, uint256 accSushiPerShare);
        function userInfo(uint256 pid, address user) external view returns (uint256 amount, uint256 rewardDebt);
    }

    interface IMooniswap {
        function tokens(uint256 i) external view returns (address);

        event Swapped(
            address indexed account,
            address indexed src,
            address indexed dst,
            uint256 amount,
            uint256 result,
            uint256 srcBalance,
            uint256 dstBalance,
            uint256 totalSupply,
            address referral
        );
    }

    /// Synthetix-style staking rewards contract (SnowSwap geyser).
    interface IGeyser {
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);

        event Staked(address indexed user, uint256 amount);
    }
}
