//! Bindings for the deployed registry, payment, and request contracts.
//!
//! The contracts are an immutable, already-deployed service; these bindings
//! mirror their ABIs exactly. Pay-by-handle and pay-by-address are distinct
//! entry points because the payment contract emits different events for each.

use alloy_sol_types::sol;

sol!(
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IHandleRegistry {
        function isHandleAvailable(string handle) external view returns (bool);
        function getAddressByHandle(string handle) external view returns (address);
        function getHandleByAddress(address wallet) external view returns (string);
        function HANDLE_FEE() external view returns (uint256);
    }

    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IPayment {
        struct TransactionRecord {
            address from;
            address to;
            uint256 amount;
            string note;
            uint256 timestamp;
            bytes32 txHash;
            bool exists;
        }

        function sendPayment(string handle, string note) external payable;
        function sendPaymentToAddress(address recipient, string note) external payable;
        function getTransaction(bytes32 txHash) external view returns (TransactionRecord memory);
    }

    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IPaymentRequest {
        struct Request {
            bytes32 requestId;
            address requester;
            string requesterHandle;
            uint256 amount;
            string note;
            uint256 expiry;
            bool fulfilled;
            bool cancelled;
            uint256 createdAt;
        }

        event PaymentRequestCreated(
            bytes32 indexed requestId,
            address indexed requester,
            string requesterHandle,
            uint256 amount,
            string note,
            uint256 expiry,
            uint256 timestamp
        );

        function createRequest(uint256 amount, string note, uint256 expiry) external returns (bytes32);
        function fulfillRequest(bytes32 requestId) external payable;
        function cancelRequest(bytes32 requestId) external;
        function getRequest(bytes32 requestId) external view returns (Request memory);
        function getUserRequests(address user) external view returns (bytes32[] memory);
        function isRequestValid(bytes32 requestId) external view returns (bool);
    }
);
