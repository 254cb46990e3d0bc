// Locking-script codec for the pay-to-address pattern:
//
//   OP_DUP OP_HASH160 <20-byte payload> OP_EQUALVERIFY OP_CHECKSIG
//
// The textual address form used by the addresses table is the hex of
// the payload.

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

pub const ADDR_PAYLOAD_LEN: usize = 20;
const PAY_TO_ADDR_SCRIPT_LEN: usize = ADDR_PAYLOAD_LEN + 5;

/// Derives the destination address from a locking script. Scripts
/// that do not match the pay-to-address pattern are an error; the
/// resolver aborts the whole batch on them rather than misclassify an
/// owned output as external.
pub fn script_to_addr(script: &[u8]) -> Result<String, String> {
    if script.len() != PAY_TO_ADDR_SCRIPT_LEN
        || script[0] != OP_DUP
        || script[1] != OP_HASH160
        || script[2] != ADDR_PAYLOAD_LEN as u8
        || script[3 + ADDR_PAYLOAD_LEN] != OP_EQUALVERIFY
        || script[4 + ADDR_PAYLOAD_LEN] != OP_CHECKSIG
    {
        let msg = format!("Unrecognized pay script: {}", hex::encode(script));
        error!("{}", msg);
        return Err(msg);
    }

    Ok(hex::encode(&script[3..3 + ADDR_PAYLOAD_LEN]))
}

/// Builds the locking script paying the given address.
pub fn pay_to_addr_script(addr: &str) -> Result<Vec<u8>, String> {
    let payload = hex::decode(addr).map_err(|e| {
        let msg = format!("Invalid address {}: {}", addr, e);
        error!("{}", msg);
        msg
    })?;
    if payload.len() != ADDR_PAYLOAD_LEN {
        let msg = format!(
            "Invalid address {}: expected {} bytes, got {}",
            addr,
            ADDR_PAYLOAD_LEN,
            payload.len()
        );
        error!("{}", msg);
        return Err(msg);
    }

    let mut script = Vec::with_capacity(PAY_TO_ADDR_SCRIPT_LEN);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(ADDR_PAYLOAD_LEN as u8);
    script.extend_from_slice(&payload);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    Ok(script)
}
