//! Data-model types: scripts, transaction components, the transaction itself, and the block
//! header/body.

pub mod block;
pub mod script;
pub mod tx;
pub mod txin;
pub mod txout;

pub use block::{Block, BlockHeader};
pub use script::{BitcoinScript, Script, ScriptPubkey, ScriptSig, ScriptType, Witness, WitnessStackItem};
pub use tx::{ParseOptions, Transaction};
pub use txin::{Input, Outpoint};
pub use txout::Output;
