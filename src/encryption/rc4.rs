/// RC4 keystream cipher. Encryption and decryption are the same operation.
pub struct Rc4 {
    initial_state: [u8; 256],
}

impl Rc4 {
    pub fn new<Key: AsRef<[u8]>>(key: Key) -> Self {
        let key = key.as_ref();
        // File keys are at least 5 bytes long; an empty key degrades to a single zero byte.
        let key: &[u8] = if key.is_empty() { &[0] } else { &key[..key.len().min(256)] };

        let mut initial_state = [0_u8; 256];
        for (i, v) in initial_state.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j = 0_u8;
        for i in 0..256 {
            j = j.wrapping_add(initial_state[i]).wrapping_add(key[i % key.len()]);
            initial_state.swap(i, j as usize);
        }

        Self { initial_state }
    }

    pub fn apply<Input: AsRef<[u8]>>(&self, input: Input) -> Vec<u8> {
        let mut state = self.initial_state;
        let mut i = 0_u8;
        let mut j = 0_u8;
        input
            .as_ref()
            .iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(state[i as usize]);
                state.swap(i as usize, j as usize);
                byte ^ state[state[i as usize].wrapping_add(state[j as usize]) as usize]
            })
            .collect()
    }
}
