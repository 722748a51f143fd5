pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Hash a byte array using the blake3 algorithm
#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    let result: [u8; HASH_SIZE] = blake3::hash(value).into();
    Hash(result)
}

// Hash several byte slices in order, as if they were concatenated
// Empty slices contribute nothing
pub fn hash_chunks<'a, I>(chunks: I) -> Hash
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        if !chunk.is_empty() {
            hasher.update(chunk);
        }
    }
    let result: [u8; HASH_SIZE] = hasher.finalize().into();
    Hash(result)
}
