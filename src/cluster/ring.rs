//! consistent hashing 링.

/// 키를 링 위의 위치로 바꾸는 함수.
pub type HashFn = fn(&[u8]) -> u32;

/**
 * 노드 주소를 해시 순으로 정렬해 둔 링.
 *
 * 키의 해시보다 크거나 같은 첫 번째 노드가 그 키의 소유자다. 그런 노드가 없으면 가장
 * 작은 해시의 노드로 돌아간다. 노드는 시작 시점에 한 번 추가되며 이후로는 읽기만 한다.
 */
pub struct HashRing {
    hash: HashFn,

    // 해시 오름차순. 해시가 같으면 먼저 추가된 노드가 앞선다.
    nodes: Vec<(u32, String)>,
}

impl HashRing {
    /// 'hash'가 'None'이면 CRC32-IEEE를 사용한다.
    pub fn new(hash: Option<HashFn>) -> HashRing {
        HashRing {
            hash: hash.unwrap_or(crc32),
            nodes: Vec::new(),
        }
    }

    /// 노드들을 링에 추가한다. 빈 주소는 무시한다.
    pub fn add_nodes<S: AsRef<str>>(&mut self, nodes: impl IntoIterator<Item = S>) {
        for node in nodes {
            let node = node.as_ref();
            if node.is_empty() {
                continue;
            }
            self.nodes.push(((self.hash)(node.as_bytes()), node.to_string()));
        }
        // 안정 정렬이므로 같은 해시의 노드는 추가된 순서를 유지한다.
        self.nodes.sort_by_key(|(hash, _)| *hash);
    }

    /// 'key'를 소유한 노드. 링이 비어있으면 'None'. 키는 원시 바이트 그대로 해시한다.
    pub fn pick_node(&self, key: &[u8]) -> Option<&str> {
        if self.nodes.is_empty() {
            return None;
        }

        let hash = (self.hash)(key);
        let idx = self.nodes.partition_point(|(node_hash, _)| *node_hash < hash);
        let (_, node) = self.nodes.get(idx).unwrap_or(&self.nodes[0]);
        Some(node)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

const CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC32 (IEEE 802.3)
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}
