//! AES-XTS with the console's sector tweak.
//!
//! The container header is sealed with AES-128-XTS under a 256-bit key split
//! into two 128-bit halves. The console derives the tweak from the sector
//! number written as a **big-endian** 128-bit value, unlike standard XTS
//! which uses little-endian; everything else (tweak encryption under the
//! second key half, GF(2^128) doubling between blocks) is ordinary XTS.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};

use crate::error::CryptoError;

/// AES-128-XTS context over a 256-bit key.
pub struct XtsAes128 {
    data_cipher: Aes128,
    tweak_cipher: Aes128,
}

impl XtsAes128 {
    /// Split a 256-bit key into data and tweak halves.
    pub fn new(key: &[u8; 0x20]) -> Self {
        let mut data_half = [0u8; 0x10];
        let mut tweak_half = [0u8; 0x10];
        data_half.copy_from_slice(&key[..0x10]);
        tweak_half.copy_from_slice(&key[0x10..]);
        Self {
            data_cipher: Aes128::new(&data_half.into()),
            tweak_cipher: Aes128::new(&tweak_half.into()),
        }
    }

    /// Encrypt `data` in place as consecutive sectors starting at
    /// `first_sector`. `data` must be a whole number of sectors and the
    /// sector size a multiple of the AES block.
    pub fn encrypt_in_place(
        &self,
        data: &mut [u8],
        first_sector: u64,
        sector_size: usize,
    ) -> Result<(), CryptoError> {
        self.check_layout(data.len(), sector_size)?;
        for (i, sector) in data.chunks_exact_mut(sector_size).enumerate() {
            let mut tweak = self.initial_tweak(first_sector + i as u64);
            for block in sector.chunks_exact_mut(0x10) {
                xor_block(block, &tweak);
                let b = Block::from_mut_slice(block);
                self.data_cipher.encrypt_block(b);
                xor_block(block, &tweak);
                gf_double(&mut tweak);
            }
        }
        Ok(())
    }

    /// Inverse of [`encrypt_in_place`](Self::encrypt_in_place).
    pub fn decrypt_in_place(
        &self,
        data: &mut [u8],
        first_sector: u64,
        sector_size: usize,
    ) -> Result<(), CryptoError> {
        self.check_layout(data.len(), sector_size)?;
        for (i, sector) in data.chunks_exact_mut(sector_size).enumerate() {
            let mut tweak = self.initial_tweak(first_sector + i as u64);
            for block in sector.chunks_exact_mut(0x10) {
                xor_block(block, &tweak);
                let b = Block::from_mut_slice(block);
                self.data_cipher.decrypt_block(b);
                xor_block(block, &tweak);
                gf_double(&mut tweak);
            }
        }
        Ok(())
    }

    fn check_layout(&self, len: usize, sector_size: usize) -> Result<(), CryptoError> {
        if sector_size == 0 || sector_size % 0x10 != 0 {
            return Err(CryptoError::UnalignedData {
                len: sector_size,
                unit: 0x10,
            });
        }
        if len % sector_size != 0 {
            return Err(CryptoError::UnalignedData {
                len,
                unit: sector_size,
            });
        }
        Ok(())
    }

    /// Tweak for a sector: the sector number as a big-endian 128-bit value,
    /// encrypted under the tweak key half.
    fn initial_tweak(&self, sector: u64) -> [u8; 0x10] {
        let mut tweak = [0u8; 0x10];
        tweak[0x8..].copy_from_slice(&sector.to_be_bytes());
        let b = Block::from_mut_slice(&mut tweak);
        self.tweak_cipher.encrypt_block(b);
        tweak
    }
}

fn xor_block(block: &mut [u8], tweak: &[u8; 0x10]) {
    for (b, t) in block.iter_mut().zip(tweak.iter()) {
        *b ^= t;
    }
}

/// Multiply the tweak by x in GF(2^128), little-endian bit order.
fn gf_double(tweak: &mut [u8; 0x10]) {
    let mut carry = 0u8;
    for byte in tweak.iter_mut() {
        let next_carry = *byte >> 7;
        *byte = (*byte << 1) | carry;
        carry = next_carry;
    }
    if carry != 0 {
        tweak[0] ^= 0x87;
    }
}
